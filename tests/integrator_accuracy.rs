//! Accuracy tests for numerical integrators
//!
//! Tests each integrator against known analytical solutions and checks the
//! batching, buffering and progress plumbing around them.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use ndarray::{Array3, ArrayD, Axis, IxDyn};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::SeedableRng;

use galorbit::prelude::*;

/// Every standard integrator with the position tolerance it reaches on the
/// oscillator at `dt = 0.01` over ten time units
const OSCILLATOR_TOLERANCES: [(&str, Scalar); 4] = [
    ("leapfrog", 1e-4),
    ("rk4", 1e-8),
    ("rk5", 1e-8),
    ("dop853", 1e-8),
];

fn runner(name: &str, potential: impl Potential + 'static) -> OrbitIntegrator {
    let integrator = IntegratorRegistry::default().create(name).unwrap();
    OrbitIntegrator::for_potential(integrator, Arc::new(potential))
}

fn oscillator() -> HarmonicOscillatorPotential {
    HarmonicOscillatorPotential::builder()
        .parameter("omega", vec![1.0])
        .build()
        .unwrap()
}

fn kepler() -> KeplerPotential {
    KeplerPotential::builder().parameter("m", 1.0).build().unwrap()
}

/// Unit circular orbit in the x-y plane, period 2π
fn circular() -> PhaseSpacePosition {
    PhaseSpacePosition::from_vectors(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], UnitSystem::default())
        .unwrap()
}

fn at_rest(x: Scalar) -> PhaseSpacePosition {
    PhaseSpacePosition::from_vectors(&[x], &[0.0], UnitSystem::default()).unwrap()
}

#[test]
fn test_oscillator_matches_analytic_solution() {
    for (name, tolerance) in OSCILLATOR_TOLERANCES {
        let orbit = runner(name, oscillator())
            .run(&at_rest(1.0), &TimeSpec::steps(0.01, 1000))
            .unwrap();

        for (i, t) in orbit.t().iter().enumerate() {
            assert_abs_diff_eq!(orbit.pos()[[0, i]], t.cos(), epsilon = tolerance);
            assert_abs_diff_eq!(orbit.vel()[[0, i]], -t.sin(), epsilon = tolerance);
        }
    }
}

#[test]
fn test_oscillator_backward_in_time() {
    for (name, tolerance) in OSCILLATOR_TOLERANCES {
        let orbit = runner(name, oscillator())
            .run(&at_rest(1.0), &TimeSpec::steps(-0.01, 1000))
            .unwrap();

        let last = orbit.n_times() - 1;
        assert_abs_diff_eq!(orbit.t()[last], -10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(orbit.pos()[[0, last]], (-10.0_f64).cos(), epsilon = tolerance);
        assert_abs_diff_eq!(orbit.vel()[[0, last]], -(-10.0_f64).sin(), epsilon = tolerance);
    }
}

#[test]
fn test_kepler_period_closure() {
    let w0 = circular();
    let time = TimeSpec::evenly_spaced(10_000, 0.0, 2.0 * PI);
    for name in ["leapfrog", "rk4", "rk5", "dop853"] {
        let orbit = runner(name, kepler()).run(&w0, &time).unwrap();
        let last = orbit.n_times() - 1;
        for k in 0..3 {
            assert_abs_diff_eq!(orbit.pos()[[k, last]], w0.pos()[[k]], epsilon = 1e-6);
            assert_abs_diff_eq!(orbit.vel()[[k, last]], w0.vel()[[k]], epsilon = 1e-6);
        }
    }
}

#[test]
fn test_oscillator_time_symmetry() {
    let w0 = PhaseSpacePosition::from_vectors(&[1.0], &[0.3], UnitSystem::default()).unwrap();

    for name in ["leapfrog", "rk4", "rk5", "dop853"] {
        let forward = runner(name, oscillator())
            .run(&w0, &TimeSpec::steps(0.01, 100))
            .unwrap();
        let last = forward.n_times() - 1;
        let end = PhaseSpacePosition::from_vectors(
            &[forward.pos()[[0, last]]],
            &[forward.vel()[[0, last]]],
            UnitSystem::default(),
        )
        .unwrap();

        let backward = runner(name, oscillator())
            .run(&end, &TimeSpec::steps(-0.01, 100).starting_at(forward.t()[last]))
            .unwrap();
        assert_abs_diff_eq!(backward.t()[last], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(backward.pos()[[0, last]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(backward.vel()[[0, last]], 0.3, epsilon = 1e-6);
    }
}

#[test]
fn test_kepler_time_symmetry() {
    let eccentric =
        PhaseSpacePosition::from_vectors(&[1.0, 0.0, 0.0], &[0.0, 1.2, 0.1], UnitSystem::default())
            .unwrap();

    for (name, tolerance) in [
        ("leapfrog", 1e-9),
        ("rk4", 1e-7),
        ("rk5", 1e-7),
        ("dop853", 1e-7),
    ] {
        let mut forward_runner = runner(name, kepler());
        let forward = forward_runner
            .run(&eccentric, &TimeSpec::steps(1e-3, 5000))
            .unwrap();

        let last = forward.n_times() - 1;
        let pos: Vec<Scalar> = (0..3).map(|k| forward.pos()[[k, last]]).collect();
        let vel: Vec<Scalar> = (0..3).map(|k| forward.vel()[[k, last]]).collect();
        let end = PhaseSpacePosition::from_vectors(&pos, &vel, UnitSystem::default()).unwrap();

        let backward = runner(name, kepler())
            .run(&end, &TimeSpec::steps(-1e-3, 5000).starting_at(forward.t()[last]))
            .unwrap();
        for k in 0..3 {
            assert_abs_diff_eq!(backward.pos()[[k, last]], eccentric.pos()[[k]], epsilon = tolerance);
            assert_abs_diff_eq!(backward.vel()[[k, last]], eccentric.vel()[[k]], epsilon = tolerance);
        }
    }
}

#[test]
fn test_batch_shape_is_preserved() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let pos = ArrayD::from_shape_fn(IxDyn(&[3, 2, 4]), |_| rng.random_range(0.5..1.5));
    let vel = ArrayD::from_shape_fn(IxDyn(&[3, 2, 4]), |_| rng.random_range(-0.3..0.3));
    let w0 = PhaseSpacePosition::new(pos, vel, UnitSystem::default()).unwrap();

    let orbit = runner("rk5", kepler())
        .run(&w0, &TimeSpec::steps(0.01, 20))
        .unwrap();
    assert_eq!(orbit.pos().shape(), &[3, 21, 2, 4]);
    assert_eq!(orbit.vel().shape(), &[3, 21, 2, 4]);
    assert_eq!(orbit.batch_shape(), &[2, 4]);
    assert_eq!(orbit.w().shape(), &[6, 21, 8]);

    let first = orbit.pos().index_axis(Axis(1), 0).to_owned();
    assert_eq!(first, *w0.pos());

    let energy = orbit.energy(&kepler()).unwrap();
    assert_eq!(energy.shape(), &[21, 2, 4]);
}

#[test]
fn test_batched_columns_are_independent() {
    let w0 = PhaseSpacePosition::from_bodies(
        &[
            (vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]),
            (vec![2.0, 0.0, 0.0], vec![0.0, 0.5, 0.2]),
        ],
        UnitSystem::default(),
    )
    .unwrap();
    let time = TimeSpec::steps(0.05, 100);
    let batched = runner("dop853", kepler()).run(&w0, &time).unwrap();
    let single = runner("dop853", kepler()).run(&circular(), &time).unwrap();

    for i in 0..batched.n_times() {
        for k in 0..3 {
            assert_abs_diff_eq!(batched.pos()[[k, i, 0]], single.pos()[[k, i]], epsilon = 1e-8);
        }
    }
}

#[test]
fn test_borrowed_and_mapped_buffers() {
    let time = TimeSpec::steps(0.01, 50);
    let expected = runner("rk4", kepler()).run(&circular(), &time).unwrap();

    let mut borrowed = Array3::zeros((6, 51, 1));
    let orbit = runner("rk4", kepler())
        .run_into(&circular(), &time, OutputBuffer::Borrowed(borrowed.view_mut()))
        .unwrap();
    assert_eq!(orbit, expected);
    assert_eq!(borrowed, expected.w());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orbit.bin");
    {
        let mut mapped = MappedBuffer::create(&path, [6, 51, 1]).unwrap();
        let orbit = runner("rk4", kepler())
            .run_into(&circular(), &time, (&mut mapped).into())
            .unwrap();
        assert_eq!(orbit, expected);
        mapped.flush().unwrap();
    }

    let reopened = MappedBuffer::open_read_only(&path, [6, 51, 1]).unwrap();
    assert_eq!(reopened.view().unwrap(), expected.w());
}

#[test]
fn test_wrong_buffer_shape_is_rejected() {
    let mut buffer = Array3::zeros((6, 50, 1));
    let error = runner("rk4", kepler())
        .run_into(
            &circular(),
            &TimeSpec::steps(0.01, 50),
            OutputBuffer::Borrowed(buffer.view_mut()),
        )
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Configuration);
}

/// Final-state distance from `reference` for DOP853 at `rtol`, with `atol`
/// held a thousand times below it
fn adaptive_error(rtol: Scalar, w0: &PhaseSpacePosition, reference: &[Scalar]) -> Scalar {
    let integrator = Dop853::default().with_tolerances(rtol, 1e-3 * rtol);
    let orbit = OrbitIntegrator::for_potential(Box::new(integrator), Arc::new(kepler()))
        .run(w0, &TimeSpec::evenly_spaced(10, 0.0, 3.0))
        .unwrap();
    final_state(&orbit)
        .iter()
        .zip(reference)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, Scalar::max)
}

#[test]
fn test_adaptive_accuracy_tracks_tolerance() {
    let w0 =
        PhaseSpacePosition::from_vectors(&[1.0, 0.0, 0.0], &[0.0, 1.2, 0.1], UnitSystem::default())
            .unwrap();
    let reference = {
        let integrator = Dop853::default().with_tolerances(1e-13, 1e-16);
        let orbit = OrbitIntegrator::for_potential(Box::new(integrator), Arc::new(kepler()))
            .run(&w0, &TimeSpec::evenly_spaced(10, 0.0, 3.0))
            .unwrap();
        final_state(&orbit)
    };

    for rtol in [1e-5, 1e-7] {
        let loose = adaptive_error(rtol, &w0, &reference);
        let tight = adaptive_error(rtol / 100.0, &w0, &reference);
        assert!(loose < 1e3 * rtol, "rtol {rtol}: error {loose}");
        // Never worse by more than a small factor, and the tolerance must bite
        assert!(tight <= 2.0 * loose, "rtol {rtol}: {tight} vs {loose}");
        assert!(tight < 0.2 * loose, "rtol {rtol}: {tight} vs {loose}");
    }
}

#[test]
fn test_dense_output_at_off_grid_times() {
    let times = vec![0.0, 0.1234, 0.5, 3.3, 7.77, 9.999];
    let orbit = runner("dop853", oscillator())
        .run(&at_rest(1.0), &TimeSpec::explicit(times.clone()))
        .unwrap();
    for (i, t) in times.iter().enumerate() {
        assert_abs_diff_eq!(orbit.pos()[[0, i]], t.cos(), epsilon = 1e-8);
        assert_abs_diff_eq!(orbit.vel()[[0, i]], -t.sin(), epsilon = 1e-8);
    }
}

/// The Lorenz system on the first three rows of a four-row state
fn lorenz() -> impl EquationOfMotion + 'static {
    FnEquation::new(2, UnitSystem::default(), |_t, w, mut dwdt| {
        for j in 0..w.ncols() {
            let (x, y, z) = (w[[0, j]], w[[1, j]], w[[2, j]]);
            dwdt[[0, j]] = 10.0 * (y - x);
            dwdt[[1, j]] = x * (28.0 - z) - y;
            dwdt[[2, j]] = x * y - 8.0 / 3.0 * z;
            dwdt[[3, j]] = 0.0;
        }
        Ok(())
    })
}

/// Damped, driven pendulum
fn pendulum() -> impl EquationOfMotion + 'static {
    FnEquation::new(1, UnitSystem::default(), |t, w, mut dwdt| {
        for j in 0..w.ncols() {
            dwdt[[0, j]] = w[[1, j]];
            dwdt[[1, j]] = -w[[0, j]].sin() - 0.5 * w[[1, j]] + 1.2 * (2.0 / 3.0 * t).cos();
        }
        Ok(())
    })
}

fn final_state(orbit: &Orbit) -> Vec<Scalar> {
    orbit.w().index_axis(Axis(1), orbit.n_times() - 1).iter().copied().collect()
}

#[test]
fn test_lorenz_system() {
    let w0 = PhaseSpacePosition::from_vectors(&[1.0, 1.0], &[1.0, 0.0], UnitSystem::default())
        .unwrap();

    let fixed = OrbitIntegrator::new(Box::new(RungeKutta::rk5()), lorenz())
        .run(&w0, &TimeSpec::steps(1e-3, 1000))
        .unwrap();
    let adaptive = OrbitIntegrator::new(Box::new(Dop853::default()), lorenz())
        .run(&w0, &TimeSpec::steps(0.1, 10))
        .unwrap();

    let expected = [-9.378_570_011, -8.357_033_789, 29.362_325_337, 0.0];
    for ((a, b), want) in final_state(&fixed).iter().zip(final_state(&adaptive)).zip(expected) {
        assert_abs_diff_eq!(*a, b, epsilon = 1e-6);
        assert_abs_diff_eq!(*a, want, epsilon = 1e-6);
    }

    let error = OrbitIntegrator::new(Box::new(Leapfrog), lorenz())
        .run(&w0, &TimeSpec::steps(1e-3, 10))
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unsupported);
}

#[test]
fn test_driven_pendulum() {
    let w0 = at_rest(0.2);

    let fixed = OrbitIntegrator::new(Box::new(RungeKutta::rk5()), pendulum())
        .run(&w0, &TimeSpec::steps(0.01, 1000))
        .unwrap();
    let adaptive = OrbitIntegrator::new(Box::new(Dop853::default()), pendulum())
        .run(&w0, &TimeSpec::steps(0.5, 20))
        .unwrap();

    let expected = [-2.854_124_293, 1.050_584_392];
    for ((a, b), want) in final_state(&fixed).iter().zip(final_state(&adaptive)).zip(expected) {
        assert_abs_diff_eq!(*a, b, epsilon = 1e-6);
        assert_abs_diff_eq!(*a, want, epsilon = 1e-6);
    }

    let error = OrbitIntegrator::new(Box::new(Leapfrog), pendulum())
        .run(&w0, &TimeSpec::steps(0.01, 10))
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unsupported);
}

#[test]
fn test_progress_is_monotone() {
    for name in ["leapfrog", "rk4", "dop853"] {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let observer = move |current: usize, total: usize| {
            record.lock().unwrap().push((current, total));
        };

        runner(name, kepler())
            .with_observer(Box::new(observer))
            .run(&circular(), &TimeSpec::steps(0.01, 40))
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 40, "{name}");
        assert!(seen.iter().all(|(_, total)| *total == 40));
        assert!(seen.windows(2).all(|pair| pair[1].0 == pair[0].0 + 1));
        assert_eq!(seen.last(), Some(&(40, 40)));
    }
}

#[test]
fn test_time_spec_forms() {
    let cases = [
        (TimeSpec::steps(0.1, 10), 11, 1.0),
        (TimeSpec::steps(0.1, 10).starting_at(5.0), 11, 6.0),
        (TimeSpec::span(0.3, 0.0, 1.0), 5, 1.0),
        (TimeSpec::evenly_spaced(4, 0.0, 2.0), 5, 2.0),
        (TimeSpec::explicit(vec![0.0, 0.25, 2.0]), 3, 2.0),
    ];
    for (time, n_times, t_end) in cases {
        let orbit = runner("rk4", kepler()).run(&circular(), &time).unwrap();
        assert_eq!(orbit.n_times(), n_times, "{time:?}");
        assert_abs_diff_eq!(orbit.t()[n_times - 1], t_end, epsilon = 1e-12);
    }

    let rejected = [
        TimeSpec::default(),
        TimeSpec::steps(0.0, 10),
        TimeSpec::span(-0.1, 0.0, 1.0),
        TimeSpec::explicit(vec![0.0, 1.0, 0.5]),
        TimeSpec::explicit(vec![0.0]),
    ];
    for time in rejected {
        let error = runner("rk4", kepler()).run(&circular(), &time).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration, "{time:?}");
    }
}
