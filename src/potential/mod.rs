//! Gravitational potentials
//!
//! A [`Potential`] supplies the value, gradient and Hessian of a scalar
//! potential over a batch of points. The required methods work on flat
//! `(ndim, n)` batches and *add* their contribution into an output buffer,
//! which lets [`CompositePotential`] sum its children with one pass each.
//! The shape-preserving public API lives on [`PotentialExt`], which every
//! potential (including `dyn Potential`) gets for free.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use ndarray::{
    Array1, Array2, Array3, ArrayD, ArrayView2, ArrayViewD, ArrayViewMut1, ArrayViewMut2,
    ArrayViewMut3, Axis, CowArray, Ix2, IxDyn,
};

use crate::error::{ConfigError, Result};
use crate::math::Scalar;
use crate::units::UnitSystem;

pub mod analytic;
pub mod builtin;
pub mod composite;
pub mod parameters;
pub mod spec;

pub use analytic::{Analytic, AnalyticBuilder, Frame, PotentialKernel};
pub use builtin::{
    HarmonicOscillatorPotential, HenonHeilesPotential, HernquistPotential, IsochronePotential,
    JaffePotential, KeplerPotential, LeeSutoTriaxialNFWPotential, LogarithmicPotential,
    LongMuraliBarPotential, MiyamotoNagaiPotential, NFWPotential, NullPotential,
    PlummerPotential, PowerLawCutoffPotential, SatohPotential, StonePotential,
    TriaxialNFWPotential,
};
pub use composite::CompositePotential;
pub use parameters::{ParameterInput, ParameterSet, ParameterValue};
pub use spec::PotentialSpec;

/// Evaluation time(s) for a batch of points
#[derive(Debug, Clone, PartialEq)]
pub enum Times<'a> {
    /// One time shared by every point
    Scalar(Scalar),
    /// One time per point, in row-major batch order
    PerPoint(Cow<'a, [Scalar]>),
}

impl Times<'_> {
    #[inline]
    pub fn at(&self, i: usize) -> Scalar {
        match self {
            Times::Scalar(t) => *t,
            Times::PerPoint(ts) => ts[i],
        }
    }

    /// The same times multiplied by `factor`, for unit conversion
    pub fn scaled(&self, factor: Scalar) -> Times<'static> {
        match self {
            Times::Scalar(t) => Times::Scalar(t * factor),
            Times::PerPoint(ts) => Times::PerPoint(ts.iter().map(|t| t * factor).collect()),
        }
    }

    pub(crate) fn check_len(&self, n: usize) -> Result<()> {
        match self {
            Times::PerPoint(ts) if ts.len() != n => Err(ConfigError::Shape(format!(
                "{} times given for {n} points",
                ts.len()
            ))
            .into()),
            _ => Ok(()),
        }
    }
}

impl From<Scalar> for Times<'static> {
    fn from(t: Scalar) -> Self {
        Times::Scalar(t)
    }
}

impl<'a> From<&'a [Scalar]> for Times<'a> {
    fn from(ts: &'a [Scalar]) -> Self {
        Times::PerPoint(Cow::Borrowed(ts))
    }
}

impl From<Vec<Scalar>> for Times<'static> {
    fn from(ts: Vec<Scalar>) -> Self {
        Times::PerPoint(Cow::Owned(ts))
    }
}

/// Batched potential evaluation.
///
/// `q` always has shape `(ndim, n)` in [`Potential::units`]. Each method adds
/// into `out`; callers zero it first.
pub trait Potential: Send + Sync + fmt::Debug {
    /// Family or composite name, for messages
    fn name(&self) -> &str;

    fn ndim(&self) -> usize;

    fn units(&self) -> &UnitSystem;

    /// Whether a static rotation is applied before evaluation
    fn is_rotated(&self) -> bool {
        false
    }

    fn parameters(&self) -> Option<&ParameterSet> {
        None
    }

    /// The same potential rebuilt with its parameters expressed in `units`.
    ///
    /// `Ok(None)` when the potential cannot rebuild itself; a
    /// [`CompositePotential`] then converts around every evaluation instead.
    fn replace_units(&self, _units: &UnitSystem) -> Result<Option<Arc<dyn Potential>>> {
        Ok(None)
    }

    fn add_energy(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        out: ArrayViewMut1<'_, Scalar>,
    ) -> Result<()>;

    /// `out` has shape `(ndim, n)`
    fn add_gradient(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        out: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()>;

    /// `out` has shape `(ndim, ndim, n)`
    fn add_hessian(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        out: ArrayViewMut3<'_, Scalar>,
    ) -> Result<()>;

    fn add_density(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        out: ArrayViewMut1<'_, Scalar>,
    ) -> Result<()>;
}

/// Shape-preserving evaluation over `[ndim, batch...]` arrays.
///
/// A 1-D input of length `ndim` is a single point and produces a
/// zero-dimensional value (or an `[ndim]` gradient).
pub trait PotentialExt: Potential {
    fn value(&self, x: ArrayViewD<'_, Scalar>, t: Times<'_>) -> Result<ArrayD<Scalar>> {
        let (q, batch) = flatten_points(self.ndim(), x)?;
        t.check_len(q.ncols())?;
        let mut out = Array1::zeros(q.ncols());
        self.add_energy(q.view(), &t, out.view_mut())?;
        reshape(out.into_dyn(), &[], &batch)
    }

    fn gradient(&self, x: ArrayViewD<'_, Scalar>, t: Times<'_>) -> Result<ArrayD<Scalar>> {
        let (q, batch) = flatten_points(self.ndim(), x)?;
        t.check_len(q.ncols())?;
        let mut out = Array2::zeros(q.raw_dim());
        self.add_gradient(q.view(), &t, out.view_mut())?;
        reshape(out.into_dyn(), &[self.ndim()], &batch)
    }

    fn hessian(&self, x: ArrayViewD<'_, Scalar>, t: Times<'_>) -> Result<ArrayD<Scalar>> {
        let ndim = self.ndim();
        let (q, batch) = flatten_points(ndim, x)?;
        t.check_len(q.ncols())?;
        let mut out = Array3::zeros((ndim, ndim, q.ncols()));
        self.add_hessian(q.view(), &t, out.view_mut())?;
        reshape(out.into_dyn(), &[ndim, ndim], &batch)
    }

    fn density(&self, x: ArrayViewD<'_, Scalar>, t: Times<'_>) -> Result<ArrayD<Scalar>> {
        let (q, batch) = flatten_points(self.ndim(), x)?;
        t.check_len(q.ncols())?;
        let mut out = Array1::zeros(q.ncols());
        self.add_density(q.view(), &t, out.view_mut())?;
        reshape(out.into_dyn(), &[], &batch)
    }

    /// Spherically-averaged enclosed mass, `r²·|∂Φ/∂r| / G`
    fn mass_enclosed(&self, x: ArrayViewD<'_, Scalar>, t: Times<'_>) -> Result<ArrayD<Scalar>> {
        let g = self.units().gravitational_constant();
        radial_profile(self, x, t, |r, dphi_dr| r * r * dphi_dr.abs() / g)
    }

    /// Circular speed, `sqrt(r·|∂Φ/∂r|)`
    fn circular_velocity(
        &self,
        x: ArrayViewD<'_, Scalar>,
        t: Times<'_>,
    ) -> Result<ArrayD<Scalar>> {
        radial_profile(self, x, t, |r, dphi_dr| libm::sqrt(r * dphi_dr.abs()))
    }

    /// Value at a single point
    fn value_at(&self, q: &[Scalar], t: Scalar) -> Result<Scalar> {
        let q = point_view(self.ndim(), q)?;
        let mut out = Array1::zeros(1);
        self.add_energy(q, &Times::Scalar(t), out.view_mut())?;
        Ok(out[0])
    }

    /// Gradient at a single point
    fn gradient_at(&self, q: &[Scalar], t: Scalar) -> Result<Vec<Scalar>> {
        let q = point_view(self.ndim(), q)?;
        let mut out = Array2::zeros((self.ndim(), 1));
        self.add_gradient(q, &Times::Scalar(t), out.view_mut())?;
        Ok(out.column(0).to_vec())
    }
}

impl<P: Potential + ?Sized> PotentialExt for P {}

fn point_view(ndim: usize, q: &[Scalar]) -> Result<ArrayView2<'_, Scalar>> {
    if q.len() != ndim {
        return Err(ConfigError::Shape(format!(
            "expected a {ndim}-dimensional point, got {}",
            q.len()
        ))
        .into());
    }
    ArrayView2::from_shape((ndim, 1), q).map_err(|e| ConfigError::Shape(e.to_string()).into())
}

/// Collapse `[ndim, batch...]` to `(ndim, n)` and remember the batch shape
pub(crate) fn flatten_points(
    ndim: usize,
    x: ArrayViewD<'_, Scalar>,
) -> Result<(CowArray<'_, Scalar, Ix2>, Vec<usize>)> {
    let shape = x.shape().to_vec();
    if shape.first() != Some(&ndim) {
        return Err(ConfigError::Shape(format!(
            "positions must have shape [{ndim}, ...], got {shape:?}"
        ))
        .into());
    }
    let batch = shape[1..].to_vec();
    let n = batch.iter().product::<usize>();

    let flat: CowArray<'_, Scalar, Ix2> = if x.is_standard_layout() {
        x.into_shape_with_order((ndim, n))
            .map_err(|e| ConfigError::Shape(e.to_string()))?
            .into()
    } else {
        x.as_standard_layout()
            .into_owned()
            .into_shape_with_order((ndim, n))
            .map_err(|e| ConfigError::Shape(e.to_string()))?
            .into()
    };
    Ok((flat, batch))
}

fn reshape(out: ArrayD<Scalar>, leading: &[usize], batch: &[usize]) -> Result<ArrayD<Scalar>> {
    let shape: Vec<usize> = leading.iter().chain(batch).copied().collect();
    out.into_shape_with_order(IxDyn(&shape))
        .map_err(|e| ConfigError::Shape(e.to_string()).into())
}

fn radial_profile<P, F>(
    potential: &P,
    x: ArrayViewD<'_, Scalar>,
    t: Times<'_>,
    profile: F,
) -> Result<ArrayD<Scalar>>
where
    P: Potential + ?Sized,
    F: Fn(Scalar, Scalar) -> Scalar,
{
    let (q, batch) = flatten_points(potential.ndim(), x)?;
    t.check_len(q.ncols())?;
    let mut grad = Array2::zeros(q.raw_dim());
    potential.add_gradient(q.view(), &t, grad.view_mut())?;

    let out: Array1<Scalar> = q
        .axis_iter(Axis(1))
        .zip(grad.axis_iter(Axis(1)))
        .map(|(point, g)| {
            let r = libm::sqrt(point.dot(&point));
            if r == 0.0 {
                0.0
            } else {
                profile(r, point.dot(&g) / r)
            }
        })
        .collect();
    reshape(out.into_dyn(), &[], &batch)
}
