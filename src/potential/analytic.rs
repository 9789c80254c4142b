//! Analytic potential families with static per-point dispatch
//!
//! A family implements [`PotentialKernel`] on plain slices in its own local
//! frame. [`Analytic`] wraps a kernel with its validated parameters, unit
//! system and [`Frame`], and runs the batch loop. The loop is monomorphized
//! per family and per frame kind, so the only dynamic dispatch is the one
//! `dyn Potential` call per batch.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, ArrayViewMut3, Axis};

use super::parameters::{Dimensionality, ParameterInput, ParameterSet, ParameterSpec};
use super::{Potential, Times};
use crate::error::{ConfigError, Result, UnsupportedError};
use crate::math::{MAX_NDIM, Scalar, rotate, rotate_transpose};
use crate::units::{Dimension, UnitSystem};

const ORTHONORMAL_TOLERANCE: Scalar = 1e-8;

/// Per-point evaluation for one analytic family.
///
/// All slices have length `ndim`; Hessians are row-major `ndim×ndim`.
/// Coordinates are already in the family's local frame.
pub trait PotentialKernel: Sized + Send + Sync + fmt::Debug + 'static {
    /// Kind key, as used by [`PotentialSpec`](super::PotentialSpec)
    const NAME: &'static str;
    const PARAMETERS: &'static [ParameterSpec];
    const DIMENSIONALITY: Dimensionality = Dimensionality::Fixed(3);
    /// Whether `∇²Φ / 4πG` is a physical density for this family
    const HAS_DENSITY: bool = true;

    /// Build from validated parameters; `g` is Newton's constant in the
    /// potential's units
    fn from_parameters(parameters: &ParameterSet, ndim: usize, g: Scalar) -> Result<Self>;

    fn energy(&self, q: &[Scalar], t: Scalar) -> Scalar;

    fn gradient(&self, q: &[Scalar], t: Scalar, out: &mut [Scalar]);

    fn hessian(&self, q: &[Scalar], t: Scalar, out: &mut [Scalar]);

    fn laplacian(&self, q: &[Scalar], t: Scalar) -> Scalar {
        let n = q.len();
        let mut h = [0.0; MAX_NDIM * MAX_NDIM];
        self.hessian(q, t, &mut h[..n * n]);
        (0..n).map(|k| h[k * n + k]).sum()
    }
}

/// Origin shift and static rotation between the global and local frames.
///
/// Local coordinates are `x' = Rᵀ(x − origin)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    origin: Vec<Scalar>,
    /// Row-major; `None` for the identity
    rotation: Option<Vec<Scalar>>,
}

impl Frame {
    pub fn identity(ndim: usize) -> Self {
        Self {
            origin: vec![0.0; ndim],
            rotation: None,
        }
    }

    pub fn new(
        ndim: usize,
        origin: Option<Vec<Scalar>>,
        rotation: Option<Array2<Scalar>>,
    ) -> Result<Self> {
        let origin = match origin {
            None => vec![0.0; ndim],
            Some(o) if o.len() != ndim => {
                return Err(ConfigError::InvalidFrame(format!(
                    "origin has {} components, expected {ndim}",
                    o.len()
                ))
                .into());
            }
            Some(o) if o.iter().any(|v| !v.is_finite()) => {
                return Err(ConfigError::InvalidFrame("origin is not finite".into()).into());
            }
            Some(o) => o,
        };

        let rotation = match rotation {
            None => None,
            Some(r) => validate_rotation(ndim, r)?,
        };

        Ok(Self { origin, rotation })
    }

    pub fn origin(&self) -> &[Scalar] {
        &self.origin
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation.is_some()
    }

    /// The rotation matrix, if not the identity
    pub fn rotation(&self) -> Option<Array2<Scalar>> {
        let n = self.origin.len();
        self.rotation
            .as_ref()
            .and_then(|r| Array2::from_shape_vec((n, n), r.clone()).ok())
    }

    #[inline]
    fn to_local<const ROTATED: bool>(&self, x: ArrayView1<'_, Scalar>, out: &mut [Scalar]) {
        let n = out.len();
        let mut shifted = [0.0; MAX_NDIM];
        for k in 0..n {
            shifted[k] = x[k] - self.origin[k];
        }
        match &self.rotation {
            Some(r) if ROTATED => rotate_transpose(r, &shifted[..n], out),
            _ => out.copy_from_slice(&shifted[..n]),
        }
    }
}

fn validate_rotation(ndim: usize, r: Array2<Scalar>) -> Result<Option<Vec<Scalar>>> {
    if r.shape() != [ndim, ndim] {
        return Err(ConfigError::InvalidFrame(format!(
            "rotation has shape {:?}, expected [{ndim}, {ndim}]",
            r.shape()
        ))
        .into());
    }
    if r.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::InvalidFrame("rotation is not finite".into()).into());
    }

    let rrt = r.dot(&r.t());
    let mut is_identity = true;
    for ((i, j), value) in rrt.indexed_iter() {
        let expected = if i == j { 1.0 } else { 0.0 };
        if (value - expected).abs() > ORTHONORMAL_TOLERANCE {
            return Err(ConfigError::InvalidFrame("rotation is not orthonormal".into()).into());
        }
        if (r[[i, j]] - expected).abs() > Scalar::EPSILON {
            is_identity = false;
        }
    }

    if is_identity {
        Ok(None)
    } else {
        Ok(Some(r.iter().copied().collect()))
    }
}

/// An analytic family bound to parameters, units and a frame
#[derive(Debug, Clone)]
pub struct Analytic<K> {
    kernel: K,
    parameters: ParameterSet,
    units: UnitSystem,
    frame: Frame,
    ndim: usize,
    g: Scalar,
}

impl<K: PotentialKernel> Analytic<K> {
    pub fn builder() -> AnalyticBuilder<K> {
        AnalyticBuilder::default()
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Rebuild in another unit system, converting every parameter and the
    /// frame origin
    pub fn with_units(&self, units: UnitSystem) -> Result<Self> {
        if self.units != units && (self.units.is_dimensionless() || units.is_dimensionless()) {
            return Err(ConfigError::Units(format!(
                "cannot move '{}' between dimensionless and physical units",
                K::NAME
            ))
            .into());
        }

        let parameters = self.parameters.converted(&self.units, &units);
        let length = self.units.conversion_factor(Dimension::LENGTH, &units);
        let origin = self.frame.origin.iter().map(|x| x * length).collect();
        let frame = Frame {
            origin,
            rotation: self.frame.rotation.clone(),
        };
        let g = units.gravitational_constant();
        let kernel = K::from_parameters(&parameters, self.ndim, g)?;

        Ok(Self {
            kernel,
            parameters,
            units,
            frame,
            ndim: self.ndim,
            g,
        })
    }

    fn energy_batch<const ROTATED: bool>(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        mut out: ArrayViewMut1<'_, Scalar>,
    ) {
        let mut local = [0.0; MAX_NDIM];
        let local = &mut local[..self.ndim];
        for (i, x) in q.axis_iter(Axis(1)).enumerate() {
            self.frame.to_local::<ROTATED>(x, local);
            out[i] += self.kernel.energy(local, t.at(i));
        }
    }

    fn gradient_batch<const ROTATED: bool>(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        mut out: ArrayViewMut2<'_, Scalar>,
    ) {
        let n = self.ndim;
        let mut local = [0.0; MAX_NDIM];
        let mut grad = [0.0; MAX_NDIM];
        let mut global = [0.0; MAX_NDIM];
        for (i, x) in q.axis_iter(Axis(1)).enumerate() {
            self.frame.to_local::<ROTATED>(x, &mut local[..n]);
            self.kernel.gradient(&local[..n], t.at(i), &mut grad[..n]);
            let g = match &self.frame.rotation {
                Some(r) if ROTATED => {
                    rotate(r, &grad[..n], &mut global[..n]);
                    &global[..n]
                }
                _ => &grad[..n],
            };
            for (k, gk) in g.iter().enumerate() {
                out[[k, i]] += gk;
            }
        }
    }

    fn density_batch<const ROTATED: bool>(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        mut out: ArrayViewMut1<'_, Scalar>,
    ) {
        let scale = 1.0 / (4.0 * PI * self.g);
        let mut local = [0.0; MAX_NDIM];
        let local = &mut local[..self.ndim];
        for (i, x) in q.axis_iter(Axis(1)).enumerate() {
            self.frame.to_local::<ROTATED>(x, local);
            out[i] += self.kernel.laplacian(local, t.at(i)) * scale;
        }
    }
}

impl<K: PotentialKernel> Potential for Analytic<K> {
    fn name(&self) -> &str {
        K::NAME
    }

    fn ndim(&self) -> usize {
        self.ndim
    }

    fn units(&self) -> &UnitSystem {
        &self.units
    }

    fn is_rotated(&self) -> bool {
        self.frame.is_rotated()
    }

    fn parameters(&self) -> Option<&ParameterSet> {
        Some(&self.parameters)
    }

    fn replace_units(&self, units: &UnitSystem) -> Result<Option<Arc<dyn Potential>>> {
        Ok(Some(Arc::new(self.with_units(units.clone())?)))
    }

    fn add_energy(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        out: ArrayViewMut1<'_, Scalar>,
    ) -> Result<()> {
        if self.frame.is_rotated() {
            self.energy_batch::<true>(q, t, out);
        } else {
            self.energy_batch::<false>(q, t, out);
        }
        Ok(())
    }

    fn add_gradient(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        out: ArrayViewMut2<'_, Scalar>,
    ) -> Result<()> {
        if self.frame.is_rotated() {
            self.gradient_batch::<true>(q, t, out);
        } else {
            self.gradient_batch::<false>(q, t, out);
        }
        Ok(())
    }

    fn add_hessian(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        mut out: ArrayViewMut3<'_, Scalar>,
    ) -> Result<()> {
        if self.frame.is_rotated() {
            return Err(UnsupportedError::RotatedHessian(K::NAME.to_string()).into());
        }

        let n = self.ndim;
        let mut local = [0.0; MAX_NDIM];
        let mut h = [0.0; MAX_NDIM * MAX_NDIM];
        for (i, x) in q.axis_iter(Axis(1)).enumerate() {
            self.frame.to_local::<false>(x, &mut local[..n]);
            self.kernel.hessian(&local[..n], t.at(i), &mut h[..n * n]);
            for k in 0..n {
                for l in 0..n {
                    out[[k, l, i]] += h[k * n + l];
                }
            }
        }
        Ok(())
    }

    fn add_density(
        &self,
        q: ArrayView2<'_, Scalar>,
        t: &Times<'_>,
        out: ArrayViewMut1<'_, Scalar>,
    ) -> Result<()> {
        if !K::HAS_DENSITY {
            return Err(UnsupportedError::Density(K::NAME.to_string()).into());
        }
        // The Laplacian is rotation invariant, so rotated frames are fine here
        if self.frame.is_rotated() {
            self.density_batch::<true>(q, t, out);
        } else {
            self.density_batch::<false>(q, t, out);
        }
        Ok(())
    }
}

/// Collects parameters and frame options for an [`Analytic`] potential
#[derive(Debug, Clone)]
pub struct AnalyticBuilder<K> {
    inputs: BTreeMap<String, ParameterInput>,
    units: UnitSystem,
    ndim: Option<usize>,
    origin: Option<Vec<Scalar>>,
    rotation: Option<Array2<Scalar>>,
    _kernel: PhantomData<fn() -> K>,
}

impl<K> Default for AnalyticBuilder<K> {
    fn default() -> Self {
        Self {
            inputs: BTreeMap::new(),
            units: UnitSystem::default(),
            ndim: None,
            origin: None,
            rotation: None,
            _kernel: PhantomData,
        }
    }
}

impl<K: PotentialKernel> AnalyticBuilder<K> {
    pub fn parameter(mut self, name: &str, value: impl Into<ParameterInput>) -> Self {
        self.inputs.insert(name.to_string(), value.into());
        self
    }

    pub fn units(mut self, units: UnitSystem) -> Self {
        self.units = units;
        self
    }

    /// Request a dimensionality; families with a fixed one reject a mismatch
    pub fn ndim(mut self, ndim: usize) -> Self {
        self.ndim = Some(ndim);
        self
    }

    pub fn origin(mut self, origin: impl Into<Vec<Scalar>>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn rotation(mut self, rotation: Array2<Scalar>) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn build(self) -> Result<Analytic<K>> {
        let ndim = K::DIMENSIONALITY.resolve(K::NAME, self.ndim, &self.inputs)?;
        let parameters =
            ParameterSet::resolve(K::NAME, K::PARAMETERS, self.inputs, ndim, &self.units)?;
        let frame = Frame::new(ndim, self.origin, self.rotation)?;
        let g = self.units.gravitational_constant();
        let kernel = K::from_parameters(&parameters, ndim, g)?;

        Ok(Analytic {
            kernel,
            parameters,
            units: self.units,
            frame,
            ndim,
            g,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::potential::PotentialExt;
    use crate::potential::builtin::{HarmonicOscillator, Hernquist, Kepler, Spherical};
    use crate::units::{AU, KPC};
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    fn z_rotation(angle: Scalar) -> Array2<Scalar> {
        let (s, c) = angle.sin_cos();
        arr2(&[[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    #[test]
    fn test_identity_rotation_is_dropped() {
        let frame = Frame::new(3, None, Some(Array2::eye(3))).unwrap();
        assert!(!frame.is_rotated());
        assert!(frame.rotation().is_none());
    }

    #[test]
    fn test_invalid_frames_rejected() {
        let skewed = arr2(&[[1.0, 0.1, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let error = Frame::new(3, None, Some(skewed)).unwrap_err();
        assert!(matches!(error, Error::Config(ConfigError::InvalidFrame(_))));

        assert!(Frame::new(3, Some(vec![0.0, 1.0]), None).is_err());
        assert!(Frame::new(3, None, Some(Array2::eye(2))).is_err());
    }

    #[test]
    fn test_origin_shifts_evaluation() {
        let centered = Analytic::<Spherical<Kepler>>::builder()
            .parameter("m", 1.0)
            .build()
            .unwrap();
        let shifted = Analytic::<Spherical<Kepler>>::builder()
            .parameter("m", 1.0)
            .origin([1.0, 0.0, 0.0])
            .build()
            .unwrap();

        let a = centered.value_at(&[1.0, 0.0, 0.0], 0.0).unwrap();
        let b = shifted.value_at(&[2.0, 0.0, 0.0], 0.0).unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-14);
    }

    #[test]
    fn test_rotation_maps_gradient_back() {
        let omega = vec![1.0, 2.0, 3.0];
        let plain = Analytic::<HarmonicOscillator>::builder()
            .parameter("omega", omega.clone())
            .build()
            .unwrap();
        let rotated = Analytic::<HarmonicOscillator>::builder()
            .parameter("omega", omega)
            .rotation(z_rotation(0.5 * PI))
            .build()
            .unwrap();
        assert!(rotated.is_rotated());

        // Rotated by 90° about z, the global x axis is the local -y axis
        let g = rotated.gradient_at(&[1.0, 0.0, 0.0], 0.0).unwrap();
        let g_local = plain.gradient_at(&[0.0, -1.0, 0.0], 0.0).unwrap();
        assert_relative_eq!(g[0], -g_local[1], epsilon = 1e-12);
        assert_relative_eq!(g[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(g[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_hessian_is_unsupported_but_density_is_not() {
        let rotated = Analytic::<Spherical<Kepler>>::builder()
            .parameter("m", 1.0)
            .rotation(z_rotation(0.3))
            .build()
            .unwrap();
        let x = arr1(&[1.0, 0.5, 0.2]).into_dyn();

        let error = rotated.hessian(x.view(), Times::Scalar(0.0)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
        assert!(rotated.density(x.view(), Times::Scalar(0.0)).is_ok());
    }

    #[test]
    fn test_with_units_converts_parameters_and_origin() {
        let galactic = Analytic::<Spherical<Hernquist>>::builder()
            .parameter("m", 1.0e10)
            .parameter("c", 1.0)
            .origin([0.5, 0.0, 0.0])
            .units(UnitSystem::galactic())
            .build()
            .unwrap();
        let solar = galactic.with_units(UnitSystem::solar_system()).unwrap();

        let au_per_kpc = KPC.si_scale() / AU.si_scale();
        assert_relative_eq!(solar.parameters.scalar("c").unwrap(), au_per_kpc, max_relative = 1e-12);
        assert_relative_eq!(solar.parameters.scalar("m").unwrap(), 1.0e10, max_relative = 1e-12);
        assert_relative_eq!(solar.frame().origin()[0], 0.5 * au_per_kpc, max_relative = 1e-12);

        // Same physical potential, so the value scales like an energy
        let x_gal = [2.0, 0.5, -0.3];
        let x_solar: Vec<Scalar> = x_gal.iter().map(|x| x * au_per_kpc).collect();
        let energy = UnitSystem::solar_system().conversion_factor(
            Dimension::ENERGY,
            &UnitSystem::galactic(),
        );
        assert_relative_eq!(
            solar.value_at(&x_solar, 0.0).unwrap() * energy,
            galactic.value_at(&x_gal, 0.0).unwrap(),
            max_relative = 1e-9
        );

        let error = galactic.with_units(UnitSystem::dimensionless()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_dimensionality_mismatch_rejected() {
        let result = Analytic::<Spherical<Kepler>>::builder()
            .parameter("m", 1.0)
            .ndim(2)
            .build();
        assert!(result.is_err());
    }
}
