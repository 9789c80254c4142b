//! Positions and velocities at one instant

use ndarray::{Array2, ArrayD, ArrayView2, Axis, IxDyn, s};

use crate::error::{ConfigError, Result};
use crate::math::Scalar;
use crate::potential::{Potential, PotentialExt, Times};
use crate::units::{Dimension, UnitSystem};

/// Positions `pos[ndim, batch...]` and velocities of the same shape
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSpacePosition {
    pos: ArrayD<Scalar>,
    vel: ArrayD<Scalar>,
    units: UnitSystem,
}

impl PhaseSpacePosition {
    pub fn new(pos: ArrayD<Scalar>, vel: ArrayD<Scalar>, units: UnitSystem) -> Result<Self> {
        if pos.shape() != vel.shape() {
            return Err(ConfigError::Shape(format!(
                "pos has shape {:?} but vel has shape {:?}",
                pos.shape(),
                vel.shape()
            ))
            .into());
        }
        if pos.ndim() == 0 || pos.shape()[0] == 0 {
            return Err(ConfigError::Shape("positions need at least one axis".into()).into());
        }
        if pos.iter().chain(vel.iter()).any(|v| !v.is_finite()) {
            return Err(ConfigError::Shape("initial conditions are not finite".into()).into());
        }
        Ok(Self { pos, vel, units })
    }

    /// One body
    pub fn from_vectors(pos: &[Scalar], vel: &[Scalar], units: UnitSystem) -> Result<Self> {
        Self::new(
            ArrayD::from_shape_vec(IxDyn(&[pos.len()]), pos.to_vec())
                .map_err(|e| ConfigError::Shape(e.to_string()))?,
            ArrayD::from_shape_vec(IxDyn(&[vel.len()]), vel.to_vec())
                .map_err(|e| ConfigError::Shape(e.to_string()))?,
            units,
        )
    }

    /// One body per entry, stacked along a single batch axis
    pub fn from_bodies(
        bodies: &[(Vec<Scalar>, Vec<Scalar>)],
        units: UnitSystem,
    ) -> Result<Self> {
        let ndim = bodies.first().map_or(0, |(pos, _)| pos.len());
        let mut pos = Array2::zeros((ndim, bodies.len()));
        let mut vel = Array2::zeros((ndim, bodies.len()));
        for (i, (p, v)) in bodies.iter().enumerate() {
            if p.len() != ndim || v.len() != ndim {
                return Err(
                    ConfigError::Shape(format!("body {i} is not {ndim}-dimensional")).into(),
                );
            }
            pos.column_mut(i).iter_mut().zip(p).for_each(|(o, x)| *o = *x);
            vel.column_mut(i).iter_mut().zip(v).for_each(|(o, x)| *o = *x);
        }
        Self::new(pos.into_dyn(), vel.into_dyn(), units)
    }

    /// Rebuild from a flat `(2*ndim, norbits)` state with the given batch shape
    pub fn from_w(
        w: ArrayView2<'_, Scalar>,
        batch_shape: &[usize],
        units: UnitSystem,
    ) -> Result<Self> {
        let ndim = w.nrows() / 2;
        if w.nrows() % 2 != 0 || w.ncols() != batch_shape.iter().product::<usize>() {
            return Err(ConfigError::Shape(format!(
                "state of shape {:?} does not match batch shape {batch_shape:?}",
                w.shape()
            ))
            .into());
        }
        let shape: Vec<usize> = std::iter::once(ndim)
            .chain(batch_shape.iter().copied())
            .collect();
        Self::new(
            unflatten(w.slice(s![..ndim, ..]), &shape)?,
            unflatten(w.slice(s![ndim.., ..]), &shape)?,
            units,
        )
    }

    pub fn pos(&self) -> &ArrayD<Scalar> {
        &self.pos
    }

    pub fn vel(&self) -> &ArrayD<Scalar> {
        &self.vel
    }

    pub fn units(&self) -> &UnitSystem {
        &self.units
    }

    pub fn ndim(&self) -> usize {
        self.pos.shape()[0]
    }

    pub fn batch_shape(&self) -> &[usize] {
        &self.pos.shape()[1..]
    }

    pub fn norbits(&self) -> usize {
        self.batch_shape().iter().product()
    }

    /// Flat state `[pos; vel]` of shape `(2*ndim, norbits)` in `units`
    pub fn to_w(&self, units: &UnitSystem) -> Array2<Scalar> {
        let ndim = self.ndim();
        let n = self.norbits();
        let length = self.units.conversion_factor(Dimension::LENGTH, units);
        let velocity = self.units.conversion_factor(Dimension::VELOCITY, units);

        let mut w = Array2::zeros((2 * ndim, n));
        // Iteration is row-major, which is exactly the flattened batch order
        w.slice_mut(s![..ndim, ..])
            .iter_mut()
            .zip(self.pos.iter())
            .for_each(|(o, x)| *o = x * length);
        w.slice_mut(s![ndim.., ..])
            .iter_mut()
            .zip(self.vel.iter())
            .for_each(|(o, v)| *o = v * velocity);
        w
    }

    /// Kinetic plus potential energy per body, `[batch...]`
    pub fn energy(&self, potential: &dyn Potential, t: Scalar) -> Result<ArrayD<Scalar>> {
        let target = potential.units();
        let length = self.units.conversion_factor(Dimension::LENGTH, target);
        let time = self.units.conversion_factor(Dimension::TIME, target);
        let back = target.conversion_factor(Dimension::ENERGY, &self.units);
        let phi = potential.value((&self.pos * length).view(), Times::Scalar(t * time))?;
        let kinetic = self.vel.mapv(|v| v * v).sum_axis(Axis(0)) * 0.5;
        Ok(kinetic + phi * back)
    }
}

fn unflatten(rows: ArrayView2<'_, Scalar>, shape: &[usize]) -> Result<ArrayD<Scalar>> {
    rows.as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(shape))
        .map_err(|e| ConfigError::Shape(e.to_string()).into())
}
