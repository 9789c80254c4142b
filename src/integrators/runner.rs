//! Driving an integrator from initial conditions to an [`Orbit`]

use std::fmt;
use std::sync::Arc;

use ndarray::Axis;
use tracing::debug;

use super::buffer::OutputBuffer;
use super::{EquationOfMotion, Hamiltonian, Integrator, ProgressObserver, Silent, TimeSpec};
use crate::dynamics::{Orbit, PhaseSpacePosition};
use crate::error::{ConfigError, Result};
use crate::potential::Potential;

/// Integrates batches of initial conditions with one integrator and equation
pub struct OrbitIntegrator {
    integrator: Box<dyn Integrator>,
    equation: Box<dyn EquationOfMotion>,
    observer: Box<dyn ProgressObserver>,
}

impl OrbitIntegrator {
    pub fn new(integrator: Box<dyn Integrator>, equation: impl EquationOfMotion + 'static) -> Self {
        Self {
            integrator,
            equation: Box::new(equation),
            observer: Box::new(Silent),
        }
    }

    /// Motion of test particles in `potential`
    pub fn for_potential(integrator: Box<dyn Integrator>, potential: Arc<dyn Potential>) -> Self {
        Self::new(integrator, Hamiltonian::from_shared(potential))
    }

    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Report progress on the terminal; needs the `progress` feature
    pub fn with_progress_bar(self) -> Result<Self> {
        #[cfg(feature = "progress")]
        {
            Ok(self.with_observer(Box::new(super::ProgressBarObserver::new())))
        }
        #[cfg(not(feature = "progress"))]
        {
            Err(ConfigError::ProgressUnavailable.into())
        }
    }

    pub fn integrator(&self) -> &dyn Integrator {
        self.integrator.as_ref()
    }

    pub fn equation(&self) -> &dyn EquationOfMotion {
        self.equation.as_ref()
    }

    /// Integrate into a freshly allocated buffer
    pub fn run(&mut self, w0: &PhaseSpacePosition, time: &TimeSpec) -> Result<Orbit> {
        self.run_into(w0, time, OutputBuffer::Allocate)
    }

    /// Integrate into `buffer`, which is checked before any stepping
    pub fn run_into(
        &mut self,
        w0: &PhaseSpacePosition,
        time: &TimeSpec,
        buffer: OutputBuffer<'_>,
    ) -> Result<Orbit> {
        let times = time.resolve()?;
        let ndim = self.equation.ndim();
        if w0.ndim() != ndim {
            return Err(ConfigError::Shape(format!(
                "initial conditions are {}-dimensional but the equation of motion is {ndim}-dimensional",
                w0.ndim()
            ))
            .into());
        }

        let units = self.equation.units().clone();
        let w = w0.to_w(&units);
        let norbits = w.ncols();
        let mut storage = buffer.prepare([2 * ndim, times.len(), norbits])?;

        debug!(
            integrator = self.integrator.name(),
            norbits,
            n_times = times.len(),
            "integrating orbits"
        );

        let grid = times.to_vec();
        {
            let mut ws = storage.view_mut();
            ws.index_axis_mut(Axis(1), 0).assign(&w);
            self.integrator
                .integrate(self.equation.as_ref(), &grid, ws, self.observer.as_mut())?;
        }
        self.observer.finish();

        Orbit::from_w(storage.view(), times, w0.batch_shape(), units)
    }
}

impl fmt::Debug for OrbitIntegrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrbitIntegrator")
            .field("integrator", &self.integrator)
            .field("ndim", &self.equation.ndim())
            .finish_non_exhaustive()
    }
}
