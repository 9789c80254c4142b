//! Resolving the requested output times

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::math::Scalar;

/// Relative slack when deciding whether `dt` divides `t2 − t1` exactly
const SPAN_TOLERANCE: Scalar = 1e-10;

/// Which output times to produce.
///
/// Exactly one of these combinations must be given:
///
/// - `t`: an explicit, strictly monotonic grid
/// - `dt`, `n_steps`, optionally `t1`: `t1 + i·dt` for `i = 0..=n_steps`
/// - `dt`, `t1`, `t2`: steps of `dt` from `t1`, ending exactly on `t2`
/// - `n_steps`, `t1`, `t2`: `n_steps + 1` evenly spaced times
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t1: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t2: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<Vec<Scalar>>,
}

impl TimeSpec {
    pub fn steps(dt: Scalar, n_steps: usize) -> Self {
        Self {
            dt: Some(dt),
            n_steps: Some(n_steps),
            ..Default::default()
        }
    }

    pub fn span(dt: Scalar, t1: Scalar, t2: Scalar) -> Self {
        Self {
            dt: Some(dt),
            t1: Some(t1),
            t2: Some(t2),
            ..Default::default()
        }
    }

    pub fn evenly_spaced(n_steps: usize, t1: Scalar, t2: Scalar) -> Self {
        Self {
            n_steps: Some(n_steps),
            t1: Some(t1),
            t2: Some(t2),
            ..Default::default()
        }
    }

    pub fn explicit(t: impl Into<Vec<Scalar>>) -> Self {
        Self {
            t: Some(t.into()),
            ..Default::default()
        }
    }

    pub fn starting_at(mut self, t1: Scalar) -> Self {
        self.t1 = Some(t1);
        self
    }

    pub fn resolve(&self) -> Result<Array1<Scalar>> {
        for (name, value) in [("dt", self.dt), ("t1", self.t1), ("t2", self.t2)] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(invalid(format!("{name} must be finite")));
            }
        }
        if self.dt == Some(0.0) {
            return Err(invalid("dt must be non-zero".into()));
        }
        if self.n_steps == Some(0) {
            return Err(invalid("n_steps must be positive".into()));
        }

        match (self.dt, self.n_steps, self.t1, self.t2, self.t.as_deref()) {
            (None, None, None, None, Some(t)) => explicit_grid(t),
            (_, _, _, _, Some(_)) => Err(invalid(
                "an explicit time array cannot be combined with other options".into(),
            )),
            (Some(_), Some(_), _, Some(_), None) => Err(invalid(
                "dt, n_steps and t2 together over-determine the grid".into(),
            )),
            (Some(dt), Some(n_steps), t1, None, None) => {
                let t1 = t1.unwrap_or(0.0);
                Ok(Array1::from_shape_fn(n_steps + 1, |i| t1 + i as Scalar * dt))
            }
            (Some(dt), None, Some(t1), Some(t2), None) => span_grid(dt, t1, t2),
            (None, Some(n_steps), Some(t1), Some(t2), None) => {
                if t1 == t2 {
                    return Err(invalid("t1 and t2 must differ".into()));
                }
                Ok(Array1::linspace(t1, t2, n_steps + 1))
            }
            _ => Err(invalid(
                "expected one of {t}, {dt, n_steps[, t1]}, {dt, t1, t2} or {n_steps, t1, t2}"
                    .into(),
            )),
        }
    }
}

fn invalid(reason: String) -> crate::error::Error {
    ConfigError::TimeSpec(reason).into()
}

fn explicit_grid(t: &[Scalar]) -> Result<Array1<Scalar>> {
    if t.len() < 2 {
        return Err(invalid("an explicit time array needs at least two entries".into()));
    }
    if t.iter().any(|v| !v.is_finite()) {
        return Err(invalid("explicit times must be finite".into()));
    }
    let increasing = t.windows(2).all(|pair| pair[1] > pair[0]);
    let decreasing = t.windows(2).all(|pair| pair[1] < pair[0]);
    if !(increasing || decreasing) {
        return Err(invalid("explicit times must be strictly monotonic".into()));
    }
    Ok(Array1::from(t.to_vec()))
}

fn span_grid(dt: Scalar, t1: Scalar, t2: Scalar) -> Result<Array1<Scalar>> {
    let ratio = (t2 - t1) / dt;
    if ratio <= 0.0 {
        return Err(invalid(format!(
            "dt = {dt} does not move from t1 = {t1} toward t2 = {t2}"
        )));
    }

    // A ratio within rounding of an integer lands exactly on t2
    let n_steps = (ratio - SPAN_TOLERANCE * ratio.max(1.0)).ceil().max(1.0) as usize;
    let mut times = Array1::from_shape_fn(n_steps + 1, |i| t1 + i as Scalar * dt);
    times[n_steps] = t2;
    Ok(times)
}
