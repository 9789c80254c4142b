//! Command line interface for galorbit

use clap::Parser;
use tracing::info;

use crate::config::ScenarioConfig;
use crate::error::Result;
use crate::integrators::IntegratorRegistry;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")");

/// galorbit - test particle orbits in analytic gravitational potentials
#[derive(Parser, Debug)]
#[command(version = VERSION, about, long_about = None)]
pub struct Args {
    /// Path to scenario file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Integrator name or alias (e.g., leapfrog, rk5, dop853)
    #[arg(short = 'i', long, value_name = "NAME")]
    pub integrator: Option<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// List available integrators and exit
    #[arg(long)]
    pub list_integrators: bool,
}

/// Handles the --list-integrators flag by printing available integrators
pub fn handle_list_integrators() {
    let registry = IntegratorRegistry::new().with_standard_integrators();
    println!("Available integrators:");
    for name in registry.list_available() {
        println!("  - {name}");
    }

    let aliases = registry.list_aliases();
    if !aliases.is_empty() {
        println!("\nAliases:");
        for (alias, target) in aliases {
            println!("  - {alias} -> {target}");
        }
    }
}

/// Loads the scenario from file or defaults, then applies command-line overrides
pub fn load_and_apply_config(args: &Args, registry: &IntegratorRegistry) -> Result<ScenarioConfig> {
    let mut config = match &args.config {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::load_from_user_config(),
    };

    if let Some(name) = &args.integrator {
        registry.create(name)?;
        info!("Using integrator: {name}");
        config.integrator.name = name.clone();
    }

    Ok(config)
}
