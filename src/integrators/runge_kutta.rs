//! Explicit Runge-Kutta integration methods

use ndarray::{Array2, ArrayViewMut3, Axis, Zip};

use super::{EquationOfMotion, Integrator, ProgressObserver, ensure_finite};
use crate::error::Result;
use crate::math::Scalar;

/// Coefficients of an explicit Runge-Kutta method
///
/// Row `i` of `a` holds the `i` weights of the earlier stages feeding stage
/// `i`, so `a[0]` is empty.
#[derive(Debug, PartialEq)]
pub struct ButcherTableau {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub order: usize,
    pub a: &'static [&'static [Scalar]],
    pub b: &'static [Scalar],
    pub c: &'static [Scalar],
}

impl ButcherTableau {
    pub fn stages(&self) -> usize {
        self.b.len()
    }
}

/// Classical fourth-order Runge-Kutta
///
/// 1. k1 = f(t, y)
/// 2. k2 = f(t + dt/2, y + k1*dt/2)
/// 3. k3 = f(t + dt/2, y + k2*dt/2)
/// 4. k4 = f(t + dt, y + k3*dt)
/// 5. y(t+dt) = y(t) + dt/6 * (k1 + 2*k2 + 2*k3 + k4)
pub static RK4: ButcherTableau = ButcherTableau {
    name: "rk4",
    aliases: &["runge_kutta_4"],
    order: 4,
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    c: &[0.0, 0.5, 0.5, 1.0],
};

/// Six-stage Cash-Karp tableau, stepping with its fifth-order weights
#[rustfmt::skip]
pub static RK5: ButcherTableau = ButcherTableau {
    name: "rk5",
    aliases: &["runge_kutta_5", "cash_karp"],
    order: 5,
    a: &[
        &[],
        &[1.0 / 5.0],
        &[3.0 / 40.0, 9.0 / 40.0],
        &[3.0 / 10.0, -9.0 / 10.0, 6.0 / 5.0],
        &[-11.0 / 54.0, 5.0 / 2.0, -70.0 / 27.0, 35.0 / 27.0],
        &[1631.0 / 55296.0, 175.0 / 512.0, 575.0 / 13824.0, 44275.0 / 110592.0, 253.0 / 4096.0],
    ],
    b: &[37.0 / 378.0, 0.0, 250.0 / 621.0, 125.0 / 594.0, 0.0, 512.0 / 1771.0],
    c: &[0.0, 1.0 / 5.0, 3.0 / 10.0, 3.0 / 5.0, 1.0, 7.0 / 8.0],
};

/// Fixed-step explicit Runge-Kutta over any equation of motion.
///
/// Each step spans one interval of the requested time grid; there is no
/// error control.
#[derive(Debug, Clone, Copy)]
pub struct RungeKutta {
    tableau: &'static ButcherTableau,
}

impl RungeKutta {
    pub fn new(tableau: &'static ButcherTableau) -> Self {
        Self { tableau }
    }

    pub fn rk4() -> Self {
        Self::new(&RK4)
    }

    pub fn rk5() -> Self {
        Self::new(&RK5)
    }

    pub fn tableau(&self) -> &'static ButcherTableau {
        self.tableau
    }
}

impl Default for RungeKutta {
    fn default() -> Self {
        Self::rk4()
    }
}

impl Integrator for RungeKutta {
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
        let tableau = self.tableau;
        let total = times.len().saturating_sub(1);
        if total == 0 {
            return Ok(());
        }

        let mut w = ws.index_axis(Axis(1), 0).to_owned();
        let mut stage = Array2::zeros(w.raw_dim());
        let mut k: Vec<Array2<Scalar>> = (0..tableau.stages())
            .map(|_| Array2::zeros(w.raw_dim()))
            .collect();

        for i in 1..times.len() {
            let t = times[i - 1];
            let dt = times[i] - t;

            for s in 0..tableau.stages() {
                stage.assign(&w);
                for (weight, kj) in tableau.a[s].iter().zip(&k) {
                    if *weight != 0.0 {
                        stage.scaled_add(dt * weight, kj);
                    }
                }
                equation.evaluate(t + tableau.c[s] * dt, stage.view(), k[s].view_mut())?;
            }

            for (weight, ks) in tableau.b.iter().zip(&k) {
                if *weight != 0.0 {
                    Zip::from(&mut w).and(ks).for_each(|w, k| *w += dt * weight * k);
                }
            }

            ensure_finite(times[i], w.view())?;
            ws.index_axis_mut(Axis(1), i).assign(&w);
            observer.notify(i, total);
        }
        Ok(())
    }

    fn convergence_order(&self) -> usize {
        self.tableau.order
    }

    fn name(&self) -> &'static str {
        self.tableau.name
    }

    fn aliases(&self) -> Vec<&'static str> {
        self.tableau.aliases.to_vec()
    }
}
