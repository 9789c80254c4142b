//! Leapfrog (kick-drift-kick) integration method

use ndarray::{Array2, ArrayViewMut3, Axis, Zip, s};

use super::{EquationOfMotion, Integrator, ProgressObserver, ensure_finite};
use crate::error::{Result, UnsupportedError};
use crate::math::Scalar;

/// Kick-drift-kick leapfrog
///
/// A second-order symplectic, time-reversible integrator for separable
/// systems `dq/dt = p`, `dp/dt = a(q, t)`. The acceleration at the end of
/// a step is reused as the start of the next, so each step costs a single
/// force evaluation.
///
/// The algorithm:
/// 1. Half kick: p(t+dt/2) = p(t) + a(t)*dt/2
/// 2. Drift: q(t+dt) = q(t) + p(t+dt/2)*dt
/// 3. Evaluate a(t+dt) at q(t+dt)
/// 4. Half kick: p(t+dt) = p(t+dt/2) + a(t+dt)*dt/2
#[derive(Debug, Clone, Copy, Default)]
pub struct Leapfrog;

impl Integrator for Leapfrog {
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
        let field = equation
            .separable()
            .ok_or_else(|| UnsupportedError::NonSeparable {
                integrator: self.name().to_string(),
            })?;

        let ndim = equation.ndim();
        let total = times.len().saturating_sub(1);
        if total == 0 {
            return Ok(());
        }

        let mut w = ws.index_axis(Axis(1), 0).to_owned();
        let mut acceleration = Array2::zeros((ndim, w.ncols()));
        field.at(times[0], w.slice(s![..ndim, ..]), acceleration.view_mut())?;

        for i in 1..times.len() {
            let dt = times[i] - times[i - 1];
            {
                let (mut q, mut p) = w.view_mut().split_at(Axis(0), ndim);
                Zip::from(&mut p)
                    .and(&acceleration)
                    .for_each(|p, a| *p += 0.5 * dt * a);
                Zip::from(&mut q).and(&p).for_each(|q, p| *q += dt * p);
            }

            field.at(times[i], w.slice(s![..ndim, ..]), acceleration.view_mut())?;
            Zip::from(w.slice_mut(s![ndim.., ..]))
                .and(&acceleration)
                .for_each(|p, a| *p += 0.5 * dt * a);

            ensure_finite(times[i], w.view())?;
            ws.index_axis_mut(Axis(1), i).assign(&w);
            observer.notify(i, total);
        }
        Ok(())
    }

    fn convergence_order(&self) -> usize {
        2
    }

    fn name(&self) -> &'static str {
        "leapfrog"
    }

    fn aliases(&self) -> Vec<&'static str> {
        vec!["lf", "kdk"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::integrators::{FnEquation, Hamiltonian, Silent};
    use crate::potential::HarmonicOscillatorPotential;
    use crate::units::UnitSystem;
    use ndarray::Array3;

    fn oscillator() -> Hamiltonian {
        Hamiltonian::new(
            HarmonicOscillatorPotential::builder()
                .parameter("omega", vec![1.0])
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_energy_stays_bounded() {
        let eq = oscillator();
        let times: Vec<Scalar> = (0..=1000).map(|i| i as Scalar * 0.05).collect();
        let mut ws = Array3::zeros((2, times.len(), 1));
        ws[[0, 0, 0]] = 1.0;

        Leapfrog
            .integrate(&eq, &times, ws.view_mut(), &mut Silent)
            .unwrap();

        for i in 0..times.len() {
            let (x, v) = (ws[[0, i, 0]], ws[[1, i, 0]]);
            let energy = 0.5 * (x * x + v * v);
            assert!((energy - 0.5).abs() < 1e-3, "energy drifted at step {i}");
        }
    }

    #[test]
    fn test_time_reversible() {
        let eq = oscillator();
        let forward: Vec<Scalar> = (0..=200).map(|i| i as Scalar * 0.01).collect();
        let mut ws = Array3::zeros((2, forward.len(), 1));
        ws[[0, 0, 0]] = 1.0;
        ws[[1, 0, 0]] = 0.3;
        Leapfrog
            .integrate(&eq, &forward, ws.view_mut(), &mut Silent)
            .unwrap();

        let backward: Vec<Scalar> = forward.iter().rev().copied().collect();
        let mut back = Array3::zeros((2, backward.len(), 1));
        back.index_axis_mut(Axis(1), 0)
            .assign(&ws.index_axis(Axis(1), forward.len() - 1));
        Leapfrog
            .integrate(&eq, &backward, back.view_mut(), &mut Silent)
            .unwrap();

        let end = backward.len() - 1;
        assert!((back[[0, end, 0]] - 1.0).abs() < 1e-10);
        assert!((back[[1, end, 0]] - 0.3).abs() < 1e-10);
    }

    #[test]
    fn test_empty_and_single_time_grids_are_no_ops() {
        let eq = oscillator();
        let mut empty = Array3::<Scalar>::zeros((2, 0, 1));
        Leapfrog
            .integrate(&eq, &[], empty.view_mut(), &mut Silent)
            .unwrap();

        let mut single = Array3::zeros((2, 1, 1));
        single[[0, 0, 0]] = 1.0;
        Leapfrog
            .integrate(&eq, &[0.0], single.view_mut(), &mut Silent)
            .unwrap();
        assert_eq!(single[[0, 0, 0]], 1.0);
    }

    #[test]
    fn test_rejects_non_separable() {
        let eq = FnEquation::new(1, UnitSystem::default(), |_t, _w, _dwdt| Ok(()));
        let mut ws = Array3::zeros((2, 3, 1));
        let error = Leapfrog
            .integrate(&eq, &[0.0, 1.0, 2.0], ws.view_mut(), &mut Silent)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
        assert!(matches!(
            error,
            Error::Unsupported(UnsupportedError::NonSeparable { .. })
        ));
    }
}
