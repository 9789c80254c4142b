//! Adaptive Dormand-Prince 8(5,3) integration with dense output

use ndarray::{Array2, ArrayView2, ArrayViewMut2, ArrayViewMut3, Axis, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::dop853_tableau::{A, B, C, D, E3, E5, INTERPOLATOR_POWER, N_STAGES, N_STAGES_EXTENDED};
use super::{EquationOfMotion, Integrator, ProgressObserver, ensure_finite};
use crate::error::{ConfigError, NumericError, Result};
use crate::math::{Scalar, rms, spacing};

const SAFETY: Scalar = 0.9;
const MIN_FACTOR: Scalar = 0.2;
const MAX_FACTOR: Scalar = 10.0;
/// `-1 / (q + 1)` for the order-7 error estimate
const ERROR_EXPONENT: Scalar = -1.0 / 8.0;

pub const DEFAULT_TOLERANCE: Scalar = 1e-10;
pub const DEFAULT_MAX_STEPS: usize = 100_000;

/// Explicit Runge-Kutta of order 8 with adaptive step size control
///
/// Each step is accepted when the combined fifth/third order error norm,
/// taken as the worst over all orbit columns, is below one. Requested
/// output times inside an accepted step are filled from a degree-7
/// interpolant, so the grid never shortens a step.
///
/// The step size update after each attempt:
/// 1. factor = 0.9 * err^(-1/8), clamped to [0.2, 10]
/// 2. after a rejection the following accepted step may not grow
/// 3. the step is clipped so the last one lands on the final time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dop853 {
    pub rtol: Scalar,
    pub atol: Scalar,
    pub max_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_step: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_step: Option<Scalar>,
}

impl Default for Dop853 {
    fn default() -> Self {
        Self {
            rtol: DEFAULT_TOLERANCE,
            atol: DEFAULT_TOLERANCE,
            max_steps: DEFAULT_MAX_STEPS,
            first_step: None,
            max_step: None,
        }
    }
}

impl Dop853 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerances(mut self, rtol: Scalar, atol: Scalar) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_first_step(mut self, first_step: Scalar) -> Self {
        self.first_step = Some(first_step);
        self
    }

    pub fn with_max_step(mut self, max_step: Scalar) -> Self {
        self.max_step = Some(max_step);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, reason: &str| -> Result<()> {
            Err(ConfigError::InvalidParameter {
                name: name.to_string(),
                reason: reason.to_string(),
            }
            .into())
        };
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return invalid("rtol", "must be finite and non-negative");
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return invalid("atol", "must be finite and non-negative");
        }
        if self.rtol == 0.0 && self.atol == 0.0 {
            return invalid("rtol", "rtol and atol cannot both be zero");
        }
        if self.max_steps == 0 {
            return invalid("max_steps", "must be positive");
        }
        if self.first_step.is_some_and(|h| !(h.is_finite() && h > 0.0)) {
            return invalid("first_step", "must be finite and positive");
        }
        if self.max_step.is_some_and(|h| h.is_nan() || h <= 0.0) {
            return invalid("max_step", "must be positive");
        }
        Ok(())
    }
}

impl Integrator for Dop853 {
    fn clone_box(&self) -> Box<dyn Integrator> {
        Box::new(*self)
    }

    fn integrate(
        &self,
        equation: &dyn EquationOfMotion,
        times: &[Scalar],
        mut ws: ArrayViewMut3<'_, Scalar>,
        observer: &mut dyn ProgressObserver,
    ) -> Result<()> {
        self.validate()?;
        let total = times.len().saturating_sub(1);
        if total == 0 {
            return Ok(());
        }

        let t_end = times[total];
        let mut t = times[0];
        let direction = if t_end >= t { 1.0 } else { -1.0 };

        let mut y = ws.index_axis(Axis(1), 0).to_owned();
        let mut work = Workspace::new(self, y.raw_dim());
        equation.evaluate(t, y.view(), work.k[0].view_mut())?;

        let mut h_abs = match self.first_step {
            Some(h) => h,
            None => work.initial_step(equation, t, y.view(), direction, (t_end - t).abs())?,
        };

        let mut next = 1;
        let (mut accepted, mut rejected) = (0usize, 0usize);

        while next <= total {
            let min_step = 10.0 * spacing(t, direction);
            if let Some(max_step) = self.max_step {
                h_abs = h_abs.min(max_step);
            }
            h_abs = h_abs.max(min_step);

            let mut step_rejected = false;
            let t_new = loop {
                if h_abs < min_step {
                    return Err(NumericError::StepSizeUnderflow { t, step: h_abs }.into());
                }
                if accepted + rejected >= self.max_steps {
                    return Err(NumericError::TooManySteps {
                        max_steps: self.max_steps,
                        t_end,
                    }
                    .into());
                }

                let mut t_new = t + direction * h_abs;
                if direction * (t_new - t_end) > 0.0 {
                    t_new = t_end;
                }
                let h = t_new - t;
                h_abs = h.abs();

                work.step(equation, t, t_new, y.view())?;
                ensure_finite(t_new, work.y_new.view())?;
                let error = work.error_norm(y.view(), h);

                if error < 1.0 {
                    let mut factor = if error == 0.0 {
                        MAX_FACTOR
                    } else {
                        (SAFETY * error.powf(ERROR_EXPONENT)).min(MAX_FACTOR)
                    };
                    if step_rejected {
                        factor = factor.min(1.0);
                    }
                    h_abs *= factor;
                    accepted += 1;
                    break t_new;
                }

                h_abs *= (SAFETY * error.powf(ERROR_EXPONENT)).max(MIN_FACTOR);
                step_rejected = true;
                rejected += 1;
            };

            let mut dense_ready = false;
            while next <= total && direction * (times[next] - t_new) <= 0.0 {
                let mut out = ws.index_axis_mut(Axis(1), next);
                if times[next] == t_new {
                    out.assign(&work.y_new);
                } else {
                    if !dense_ready {
                        work.prepare_dense(equation, t, t_new, y.view())?;
                        dense_ready = true;
                    }
                    work.interpolate((times[next] - t) / (t_new - t), y.view(), out);
                }
                observer.notify(next, total);
                next += 1;
            }

            std::mem::swap(&mut y, &mut work.y_new);
            work.k.swap(0, N_STAGES);
            t = t_new;
        }

        debug!(accepted, rejected, "dop853 integration finished");
        Ok(())
    }

    fn convergence_order(&self) -> usize {
        8
    }

    fn name(&self) -> &'static str {
        "dop853"
    }

    fn aliases(&self) -> Vec<&'static str> {
        vec!["dopri853", "adaptive"]
    }
}

/// Scratch arrays reused across steps, all `(2*ndim, norbits)`
struct Workspace {
    rtol: Scalar,
    atol: Scalar,
    /// Stage derivatives; `k[0]` is f(t, y), `k[12]` is f(t_new, y_new)
    k: Vec<Array2<Scalar>>,
    stage: Array2<Scalar>,
    y_new: Array2<Scalar>,
    err5: Array2<Scalar>,
    err3: Array2<Scalar>,
    dense: Vec<Array2<Scalar>>,
}

impl Workspace {
    fn new(settings: &Dop853, dim: ndarray::Ix2) -> Self {
        let zeros = || Array2::zeros(dim);
        Self {
            rtol: settings.rtol,
            atol: settings.atol,
            k: (0..N_STAGES_EXTENDED).map(|_| zeros()).collect(),
            stage: zeros(),
            y_new: zeros(),
            err5: zeros(),
            err3: zeros(),
            dense: (0..INTERPOLATOR_POWER).map(|_| zeros()).collect(),
        }
    }

    fn scale(&self, y: Scalar, y_new: Scalar) -> Scalar {
        self.atol + self.rtol * y.abs().max(y_new.abs())
    }

    /// Evaluate stage `s` from the stages before it
    fn evaluate_stage(
        &mut self,
        equation: &dyn EquationOfMotion,
        s: usize,
        t: Scalar,
        h: Scalar,
        y: ArrayView2<'_, Scalar>,
    ) -> Result<()> {
        self.stage.assign(&y);
        for (a, k) in A[s].iter().zip(&self.k) {
            if *a != 0.0 {
                self.stage.scaled_add(h * a, k);
            }
        }
        equation.evaluate(t + C[s] * h, self.stage.view(), self.k[s].view_mut())
    }

    /// One trial step from `(t, y)` to `t_new`, leaving `y_new` and `k[12]`
    fn step(
        &mut self,
        equation: &dyn EquationOfMotion,
        t: Scalar,
        t_new: Scalar,
        y: ArrayView2<'_, Scalar>,
    ) -> Result<()> {
        let h = t_new - t;
        for s in 1..N_STAGES {
            self.evaluate_stage(equation, s, t, h, y)?;
        }

        self.y_new.assign(&y);
        for (b, k) in B.iter().zip(&self.k) {
            if *b != 0.0 {
                self.y_new.scaled_add(h * b, k);
            }
        }
        equation.evaluate(t_new, self.y_new.view(), self.k[N_STAGES].view_mut())
    }

    /// Worst column of `|h|·‖e5‖² / sqrt((‖e5‖² + 0.01‖e3‖²)·n)`
    fn error_norm(&mut self, y: ArrayView2<'_, Scalar>, h: Scalar) -> Scalar {
        self.err5.fill(0.0);
        self.err3.fill(0.0);
        for ((e5, e3), k) in E5.iter().zip(&E3).zip(&self.k) {
            if *e5 != 0.0 {
                self.err5.scaled_add(*e5, k);
            }
            if *e3 != 0.0 {
                self.err3.scaled_add(*e3, k);
            }
        }

        let n = y.nrows() as Scalar;
        let mut worst: Scalar = 0.0;
        for j in 0..y.ncols() {
            let (mut e5_sq, mut e3_sq) = (0.0, 0.0);
            for i in 0..y.nrows() {
                let scale = self.scale(y[[i, j]], self.y_new[[i, j]]);
                e5_sq += (self.err5[[i, j]] / scale).powi(2);
                e3_sq += (self.err3[[i, j]] / scale).powi(2);
            }
            if e5_sq == 0.0 && e3_sq == 0.0 {
                continue;
            }
            let column = h.abs() * e5_sq / libm::sqrt((e5_sq + 0.01 * e3_sq) * n);
            worst = worst.max(column);
        }
        worst
    }

    /// Hairer's starting step estimate, the smallest over all columns
    fn initial_step(
        &mut self,
        equation: &dyn EquationOfMotion,
        t0: Scalar,
        y: ArrayView2<'_, Scalar>,
        direction: Scalar,
        interval: Scalar,
    ) -> Result<Scalar> {
        let (rtol, atol) = (self.rtol, self.atol);
        let scaled = |values: &Array2<Scalar>, j: usize| scaled_rms(values.view(), y, j, rtol, atol);

        let d1: Vec<Scalar> = (0..y.ncols()).map(|j| scaled(&self.k[0], j)).collect();
        let h0 = (0..y.ncols())
            .map(|j| {
                let d0 = scaled_rms(y, y, j, rtol, atol);
                if d0 < 1e-5 || d1[j] < 1e-5 {
                    1e-6
                } else {
                    0.01 * d0 / d1[j]
                }
            })
            .fold(interval, Scalar::min);

        self.stage.assign(&y);
        self.stage.scaled_add(h0 * direction, &self.k[0]);
        equation.evaluate(t0 + h0 * direction, self.stage.view(), self.k[1].view_mut())?;
        Zip::from(&mut self.err5)
            .and(&self.k[1])
            .and(&self.k[0])
            .for_each(|d, f1, f0| *d = f1 - f0);

        let h = (0..y.ncols())
            .map(|j| {
                let d2 = scaled(&self.err5, j) / h0;
                let h1 = if d1[j] <= 1e-15 && d2 <= 1e-15 {
                    (h0 * 1e-3).max(1e-6)
                } else {
                    (0.01 / d1[j].max(d2)).powf(-ERROR_EXPONENT)
                };
                h1.min(100.0 * h0)
            })
            .fold(interval, Scalar::min);
        Ok(h)
    }

    /// Extra stages and interpolant coefficients for the step just taken
    fn prepare_dense(
        &mut self,
        equation: &dyn EquationOfMotion,
        t: Scalar,
        t_new: Scalar,
        y: ArrayView2<'_, Scalar>,
    ) -> Result<()> {
        let h = t_new - t;
        for s in N_STAGES + 1..N_STAGES_EXTENDED {
            self.evaluate_stage(equation, s, t, h, y)?;
        }

        let (f_old, f_new) = (&self.k[0], &self.k[N_STAGES]);
        let (head, tail) = self.dense.split_at_mut(3);
        let [delta, first, second] = head else {
            unreachable!("the interpolant has {INTERPOLATOR_POWER} coefficients");
        };
        Zip::from(&mut *delta)
            .and(&self.y_new)
            .and(&y)
            .for_each(|d, y_new, y| *d = y_new - y);
        Zip::from(first)
            .and(&*delta)
            .and(f_old)
            .for_each(|d, delta, f| *d = h * f - delta);
        Zip::from(second)
            .and(&*delta)
            .and(f_old)
            .and(f_new)
            .for_each(|d, delta, f_old, f_new| *d = 2.0 * delta - h * (f_new + f_old));

        for (coefficient, row) in tail.iter_mut().zip(D.iter()) {
            coefficient.fill(0.0);
            for (d, k) in row.iter().zip(&self.k) {
                if *d != 0.0 {
                    coefficient.scaled_add(h * d, k);
                }
            }
        }
        Ok(())
    }

    /// Dense solution at fraction `x` of the step into `out`
    fn interpolate(&self, x: Scalar, y: ArrayView2<'_, Scalar>, mut out: ArrayViewMut2<'_, Scalar>) {
        out.fill(0.0);
        for (i, coefficient) in self.dense.iter().rev().enumerate() {
            let factor = if i % 2 == 0 { x } else { 1.0 - x };
            Zip::from(&mut out)
                .and(coefficient)
                .for_each(|o, c| *o = (*o + c) * factor);
        }
        out += &y;
    }
}

/// RMS over column `j` of `values / (atol + |y|·rtol)`
fn scaled_rms(
    values: ArrayView2<'_, Scalar>,
    y: ArrayView2<'_, Scalar>,
    j: usize,
    rtol: Scalar,
    atol: Scalar,
) -> Scalar {
    rms(values
        .column(j)
        .iter()
        .zip(y.column(j))
        .map(|(v, y)| v / (atol + y.abs() * rtol)))
}
