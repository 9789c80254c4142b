//! Right-hand sides for the integrators
//!
//! The state `w` is always `(2*ndim, norbits)`: positions in the first
//! `ndim` rows, velocities in the rest. Every evaluation covers all orbit
//! columns at once.

use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayView2, ArrayViewMut2, Axis, s};

use crate::error::Result;
use crate::math::Scalar;
use crate::potential::{Potential, Times};
use crate::units::UnitSystem;

/// Position-only acceleration, for integrators that split kicks and drifts
pub trait AccelerationField: Send + Sync {
    /// Overwrite `out` (`ndim × norbits`) with the acceleration at `q`
    fn at(
        &self,
        t: Scalar,
        q: ArrayView2<'_, Scalar>,
        out: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()>;
}

/// A first-order system `dw/dt = f(t, w)`
pub trait EquationOfMotion: Send + Sync {
    fn ndim(&self) -> usize;

    fn units(&self) -> &UnitSystem;

    /// Overwrite `dwdt` with `f(t, w)`
    fn evaluate(
        &self,
        t: Scalar,
        w: ArrayView2<'_, Scalar>,
        dwdt: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()>;

    /// The acceleration alone, when `dq/dt = p` and `dp/dt` depends only on `q`
    fn separable(&self) -> Option<&dyn AccelerationField> {
        None
    }
}

/// Motion in a potential: `dq/dt = p`, `dp/dt = −∇Φ(q, t)`
#[derive(Debug, Clone)]
pub struct Hamiltonian {
    potential: Arc<dyn Potential>,
}

impl Hamiltonian {
    pub fn new(potential: impl Potential + 'static) -> Self {
        Self {
            potential: Arc::new(potential),
        }
    }

    pub fn from_shared(potential: Arc<dyn Potential>) -> Self {
        Self { potential }
    }

    pub fn potential(&self) -> &Arc<dyn Potential> {
        &self.potential
    }
}

impl AccelerationField for Hamiltonian {
    fn at(
        &self,
        t: Scalar,
        q: ArrayView2<'_, Scalar>,
        mut out: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()> {
        out.fill(0.0);
        self.potential
            .add_gradient(q, &Times::Scalar(t), out.view_mut())?;
        out.mapv_inplace(|g| -g);
        Ok(())
    }
}

impl EquationOfMotion for Hamiltonian {
    fn ndim(&self) -> usize {
        self.potential.ndim()
    }

    fn units(&self) -> &UnitSystem {
        self.potential.units()
    }

    fn evaluate(
        &self,
        t: Scalar,
        w: ArrayView2<'_, Scalar>,
        dwdt: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()> {
        let ndim = self.ndim();
        let (mut dq, dp) = dwdt.split_at(Axis(0), ndim);
        dq.assign(&w.slice(s![ndim.., ..]));
        self.at(t, w.slice(s![..ndim, ..]), dp)
    }

    fn separable(&self) -> Option<&dyn AccelerationField> {
        Some(self)
    }
}

/// Any first-order vector field given as a closure
pub struct FnEquation<F> {
    ndim: usize,
    units: UnitSystem,
    f: F,
}

impl<F> FnEquation<F>
where
    F: Fn(Scalar, ArrayView2<'_, Scalar>, ArrayViewMut2<'_, Scalar>) -> Result<()> + Send + Sync,
{
    /// `ndim` is half the number of state rows
    pub fn new(ndim: usize, units: UnitSystem, f: F) -> Self {
        Self { ndim, units, f }
    }
}

impl<F> fmt::Debug for FnEquation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEquation")
            .field("ndim", &self.ndim)
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

impl<F> EquationOfMotion for FnEquation<F>
where
    F: Fn(Scalar, ArrayView2<'_, Scalar>, ArrayViewMut2<'_, Scalar>) -> Result<()> + Send + Sync,
{
    fn ndim(&self) -> usize {
        self.ndim
    }

    fn units(&self) -> &UnitSystem {
        &self.units
    }

    fn evaluate(
        &self,
        t: Scalar,
        w: ArrayView2<'_, Scalar>,
        dwdt: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()> {
        (self.f)(t, w, dwdt)
    }
}

/// A separable system given by its acceleration closure
pub struct SeparableFn<F> {
    ndim: usize,
    units: UnitSystem,
    acceleration: F,
}

impl<F> SeparableFn<F>
where
    F: Fn(Scalar, ArrayView2<'_, Scalar>, ArrayViewMut2<'_, Scalar>) -> Result<()> + Send + Sync,
{
    pub fn new(ndim: usize, units: UnitSystem, acceleration: F) -> Self {
        Self {
            ndim,
            units,
            acceleration,
        }
    }
}

impl<F> fmt::Debug for SeparableFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeparableFn")
            .field("ndim", &self.ndim)
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

impl<F> AccelerationField for SeparableFn<F>
where
    F: Fn(Scalar, ArrayView2<'_, Scalar>, ArrayViewMut2<'_, Scalar>) -> Result<()> + Send + Sync,
{
    fn at(
        &self,
        t: Scalar,
        q: ArrayView2<'_, Scalar>,
        out: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()> {
        (self.acceleration)(t, q, out)
    }
}

impl<F> EquationOfMotion for SeparableFn<F>
where
    F: Fn(Scalar, ArrayView2<'_, Scalar>, ArrayViewMut2<'_, Scalar>) -> Result<()> + Send + Sync,
{
    fn ndim(&self) -> usize {
        self.ndim
    }

    fn units(&self) -> &UnitSystem {
        &self.units
    }

    fn evaluate(
        &self,
        t: Scalar,
        w: ArrayView2<'_, Scalar>,
        dwdt: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()> {
        let ndim = self.ndim;
        let (mut dq, dp) = dwdt.split_at(Axis(0), ndim);
        dq.assign(&w.slice(s![ndim.., ..]));
        self.at(t, w.slice(s![..ndim, ..]), dp)
    }

    fn separable(&self) -> Option<&dyn AccelerationField> {
        Some(self)
    }
}
