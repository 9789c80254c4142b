use anyhow::{Context, Result};
use clap::Parser;
use ndarray::{Axis, s};
use tracing::info;
use tracing_subscriber::EnvFilter;

use galorbit::cli::{self, Args};
use galorbit::integrators::{IntegratorRegistry, OrbitIntegrator};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose {
        "galorbit=debug"
    } else {
        "galorbit=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if args.list_integrators {
        cli::handle_list_integrators();
        return Ok(());
    }

    let registry = IntegratorRegistry::default();
    let config = cli::load_and_apply_config(&args, &registry).context("invalid scenario")?;

    let potential = config.build_potential()?;
    let w0 = config.initial_conditions()?;
    let integrator = config.integrator.build(&registry)?;
    info!(
        integrator = integrator.name(),
        potential = potential.name(),
        norbits = w0.norbits(),
        "starting integration"
    );

    let mut runner = OrbitIntegrator::for_potential(integrator, potential.clone());
    if cfg!(feature = "progress") {
        runner = runner.with_progress_bar()?;
    }
    let orbit = runner.run(&w0, &config.time).context("integration failed")?;

    let ndim = orbit.ndim();
    let n_times = orbit.n_times();
    let energy = orbit
        .energy(potential.as_ref())?
        .into_shape_with_order((n_times, orbit.norbits()))
        .context("energy history has an unexpected shape")?;
    let w = orbit.w();
    let t_end = orbit.t()[n_times - 1];

    for (j, final_state) in w.index_axis(Axis(1), n_times - 1).columns().into_iter().enumerate() {
        let e0 = energy[[0, j]];
        let drift = if e0 != 0.0 {
            ((energy[[n_times - 1, j]] - e0) / e0).abs()
        } else {
            (energy[[n_times - 1, j]] - e0).abs()
        };
        info!(
            orbit = j,
            t = t_end,
            pos = ?final_state.slice(s![..ndim]).to_vec(),
            vel = ?final_state.slice(s![ndim..]).to_vec(),
            energy_drift = drift,
            "final state"
        );
    }

    Ok(())
}
