//! Orbit integration over batched first-order states
//!
//! Every integrator advances all orbit columns of a `(2*ndim, norbits)`
//! state together and writes one snapshot per requested time into a
//! `(2*ndim, n_times, norbits)` buffer.

use std::fmt::Debug;

use ndarray::{ArrayView2, ArrayViewMut3};

use crate::error::{NumericError, Result};
use crate::math::Scalar;

pub mod buffer;
pub mod dop853;
mod dop853_tableau;
pub mod equation;
pub mod leapfrog;
pub mod progress;
pub mod registry;
pub mod runge_kutta;
pub mod runner;
pub mod time_spec;

pub use buffer::{MappedBuffer, OutputBuffer};
pub use dop853::Dop853;
pub use equation::{AccelerationField, EquationOfMotion, FnEquation, Hamiltonian, SeparableFn};
pub use leapfrog::Leapfrog;
pub use progress::{ProgressObserver, Silent};
pub use registry::IntegratorRegistry;
pub use runge_kutta::{ButcherTableau, RungeKutta};
pub use runner::OrbitIntegrator;
pub use time_spec::TimeSpec;

#[cfg(feature = "progress")]
pub use progress::ProgressBarObserver;

/// Base trait for all integrators
pub trait Integrator: Send + Sync + Debug {
    /// Create a boxed clone of this integrator
    fn clone_box(&self) -> Box<dyn Integrator>;

    /// Fill `ws[:, 1.., :]` by integrating from the state in `ws[:, 0, :]`.
    ///
    /// # Arguments
    /// * `equation` - Right-hand side, evaluated on whole batches
    /// * `times` - Requested output times, strictly monotonic, `times[0]` is
    ///   the time of the initial state
    /// * `ws` - Output buffer of shape `(2*ndim, times.len(), norbits)`
    /// * `observer` - Notified with `(i, times.len() - 1)` after snapshot `i`
    fn integrate(
        &self,
        equation: &dyn EquationOfMotion,
        times: &[Scalar],
        ws: ArrayViewMut3<'_, Scalar>,
        observer: &mut dyn ProgressObserver,
    ) -> Result<()>;

    /// Get the convergence order of this integrator
    fn convergence_order(&self) -> usize;

    /// Get the canonical name of this integrator
    fn name(&self) -> &'static str;

    /// Alternative names this integrator can be created by
    fn aliases(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

impl Clone for Box<dyn Integrator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

pub(crate) fn ensure_finite(t: Scalar, w: ArrayView2<'_, Scalar>) -> Result<()> {
    if w.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(NumericError::NonFinite { t }.into())
    }
}
