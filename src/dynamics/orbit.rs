//! Integrated orbits

use std::ops::Range;

use ndarray::{Array1, Array3, ArrayD, ArrayView3, ArrayViewD, Axis, IxDyn, s};

use crate::error::{ConfigError, Result};
use crate::math::Scalar;
use crate::potential::{Potential, PotentialExt, Times};
use crate::units::{Dimension, UnitSystem};

/// Position and velocity histories on a time grid.
///
/// `pos` and `vel` have shape `[ndim, n_times, batch...]`. A single orbit
/// has no batch axes at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Orbit {
    pos: ArrayD<Scalar>,
    vel: ArrayD<Scalar>,
    t: Array1<Scalar>,
    units: UnitSystem,
}

impl Orbit {
    pub fn new(
        pos: ArrayD<Scalar>,
        vel: ArrayD<Scalar>,
        t: Array1<Scalar>,
        units: UnitSystem,
    ) -> Result<Self> {
        if pos.shape() != vel.shape() || pos.ndim() < 2 || pos.shape()[1] != t.len() {
            return Err(ConfigError::Shape(format!(
                "orbit pos {:?} and vel {:?} do not match {} times",
                pos.shape(),
                vel.shape(),
                t.len()
            ))
            .into());
        }
        Ok(Self { pos, vel, t, units })
    }

    /// Split a `(2*ndim, n_times, norbits)` state history.
    ///
    /// `batch_shape` is restored on the trailing axes unless there is only
    /// one orbit, in which case they are dropped.
    pub fn from_w(
        ws: ArrayView3<'_, Scalar>,
        t: Array1<Scalar>,
        batch_shape: &[usize],
        units: UnitSystem,
    ) -> Result<Self> {
        let (rows, nt, norbits) = ws.dim();
        if rows % 2 != 0 || nt != t.len() || norbits != batch_shape.iter().product::<usize>() {
            return Err(ConfigError::BufferShape {
                expected: [rows, t.len(), batch_shape.iter().product()],
                actual: ws.shape().to_vec(),
            }
            .into());
        }

        let ndim = rows / 2;
        let mut shape = vec![ndim, nt];
        if norbits != 1 {
            shape.extend_from_slice(batch_shape);
        }
        let pos = unflatten(ws, 0..ndim, &shape)?;
        let vel = unflatten(ws, ndim..rows, &shape)?;
        Self::new(pos, vel, t, units)
    }

    pub fn pos(&self) -> ArrayViewD<'_, Scalar> {
        self.pos.view()
    }

    pub fn vel(&self) -> ArrayViewD<'_, Scalar> {
        self.vel.view()
    }

    pub fn t(&self) -> &Array1<Scalar> {
        &self.t
    }

    pub fn units(&self) -> &UnitSystem {
        &self.units
    }

    pub fn ndim(&self) -> usize {
        self.pos.shape()[0]
    }

    pub fn n_times(&self) -> usize {
        self.t.len()
    }

    pub fn batch_shape(&self) -> &[usize] {
        &self.pos.shape()[2..]
    }

    pub fn norbits(&self) -> usize {
        self.batch_shape().iter().product()
    }

    /// Stacked `[pos; vel]` history of shape `(2*ndim, n_times, norbits)`
    pub fn w(&self) -> Array3<Scalar> {
        let ndim = self.ndim();
        let mut w = Array3::zeros((2 * ndim, self.n_times(), self.norbits()));
        w.slice_mut(s![..ndim, .., ..])
            .iter_mut()
            .zip(self.pos.iter())
            .for_each(|(o, x)| *o = *x);
        w.slice_mut(s![ndim.., .., ..])
            .iter_mut()
            .zip(self.vel.iter())
            .for_each(|(o, v)| *o = *v);
        w
    }

    pub fn pos_in(&self, units: &UnitSystem) -> ArrayD<Scalar> {
        &self.pos * self.units.conversion_factor(Dimension::LENGTH, units)
    }

    pub fn vel_in(&self, units: &UnitSystem) -> ArrayD<Scalar> {
        &self.vel * self.units.conversion_factor(Dimension::VELOCITY, units)
    }

    pub fn t_in(&self, units: &UnitSystem) -> Array1<Scalar> {
        &self.t * self.units.conversion_factor(Dimension::TIME, units)
    }

    /// Kinetic plus potential energy, `[n_times, batch...]`
    pub fn energy(&self, potential: &dyn Potential) -> Result<ArrayD<Scalar>> {
        let target = potential.units();
        let pos = self.pos_in(target);
        let t = self.t_in(target);

        let per_time = self.norbits();
        let times: Vec<Scalar> = (0..self.n_times() * per_time)
            .map(|j| t[j / per_time])
            .collect();

        let phi = potential.value(pos.view(), Times::from(times))?;
        let back = target.conversion_factor(Dimension::ENERGY, &self.units);
        let kinetic = self.vel.mapv(|v| v * v).sum_axis(Axis(0)) * 0.5;
        Ok(kinetic + phi * back)
    }
}

fn unflatten(
    ws: ArrayView3<'_, Scalar>,
    rows: Range<usize>,
    shape: &[usize],
) -> Result<ArrayD<Scalar>> {
    ws.slice(s![rows, .., ..])
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(shape))
        .map_err(|e| ConfigError::Shape(e.to_string()).into())
}
