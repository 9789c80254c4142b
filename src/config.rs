//! Scenario files: units, potential, integrator, time grid and orbits

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dynamics::PhaseSpacePosition;
use crate::error::{ConfigError, Result};
use crate::integrators::{Dop853, Integrator, IntegratorRegistry, TimeSpec};
use crate::math::Scalar;
use crate::potential::{CompositePotential, Potential, PotentialSpec};
use crate::units::UnitSystem;

/// Prefix for environment overrides, e.g. `GALORBIT_INTEGRATOR__NAME=rk5`
pub const ENV_PREFIX: &str = "GALORBIT";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Unit system preset: `galactic`, `solar_system` or `dimensionless`
    pub units: String,
    pub integrator: IntegratorConfig,
    pub time: TimeSpec,
    /// Components of the total potential, summed in key order
    pub potential: BTreeMap<String, PotentialSpec>,
    pub orbits: Vec<OrbitConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            units: "dimensionless".to_string(),
            integrator: IntegratorConfig::default(),
            time: TimeSpec::evenly_spaced(1000, 0.0, 2.0 * std::f64::consts::PI),
            potential: BTreeMap::from([(
                "point_mass".to_string(),
                PotentialSpec::new("kepler").with_parameter("m", 1.0),
            )]),
            orbits: vec![OrbitConfig {
                pos: vec![1.0, 0.0, 0.0],
                vel: vec![0.0, 1.0, 0.0],
            }],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Registry name or alias
    pub name: String,
    /// The remaining settings only apply to `dop853`
    pub rtol: Scalar,
    pub atol: Scalar,
    pub max_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_step: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_step: Option<Scalar>,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        let adaptive = Dop853::default();
        Self {
            name: "dop853".to_string(),
            rtol: adaptive.rtol,
            atol: adaptive.atol,
            max_steps: adaptive.max_steps,
            first_step: adaptive.first_step,
            max_step: adaptive.max_step,
        }
    }
}

impl IntegratorConfig {
    /// Create the named integrator, carrying over the adaptive settings
    pub fn build(&self, registry: &IntegratorRegistry) -> Result<Box<dyn Integrator>> {
        let integrator = registry.create(&self.name)?;
        if integrator.name() != Dop853::default().name() {
            return Ok(integrator);
        }
        let adaptive = Dop853 {
            rtol: self.rtol,
            atol: self.atol,
            max_steps: self.max_steps,
            first_step: self.first_step,
            max_step: self.max_step,
        };
        adaptive.validate()?;
        Ok(Box::new(adaptive))
    }
}

/// One test particle
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct OrbitConfig {
    pub pos: Vec<Scalar>,
    pub vel: Vec<Scalar>,
}

impl ScenarioConfig {
    /// Default scenario location, `<config_dir>/galorbit/scenario.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("galorbit").join("scenario.toml"))
    }

    /// Load a TOML file with `GALORBIT_*` environment overrides on top
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::ConfigLoad(format!("{}: {e}", path.display())))?;
        settings
            .try_deserialize()
            .map_err(|e| ConfigError::ConfigLoad(format!("{}: {e}", path.display())).into())
    }

    /// Load configuration from a file, falling back to defaults if it cannot be read
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded scenario from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{e}. Using the default scenario.");
                Self::default()
            }
        }
    }

    /// Load from [`default_path`](Self::default_path), or defaults if absent
    pub fn load_from_user_config() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_or_default(path),
            _ => Self::default(),
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ConfigLoad(format!("cannot serialize scenario: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn unit_system(&self) -> Result<UnitSystem> {
        UnitSystem::from_preset(&self.units)
    }

    /// Sum of every `[potential.*]` component
    pub fn build_potential(&self) -> Result<Arc<dyn Potential>> {
        let units = self.unit_system()?;
        let mut total = CompositePotential::new(units.clone());
        for (name, spec) in &self.potential {
            let component = spec.build(&units)?;
            if let Some(parameters) = component.parameters() {
                for (parameter, value) in parameters.iter() {
                    debug!(
                        component = name.as_str(),
                        kind = component.name(),
                        parameter,
                        value = ?value.value,
                        unit = units.unit_for(value.dimension).symbol(),
                        "potential parameter"
                    );
                }
            }
            total.insert_shared(name.as_str(), component)?;
        }
        if total.is_empty() {
            return Err(ConfigError::ConfigLoad("the scenario has no potential".into()).into());
        }
        Ok(Arc::new(total))
    }

    pub fn initial_conditions(&self) -> Result<PhaseSpacePosition> {
        if self.orbits.is_empty() {
            return Err(ConfigError::ConfigLoad("the scenario has no orbits".into()).into());
        }
        let bodies: Vec<(Vec<Scalar>, Vec<Scalar>)> = self
            .orbits
            .iter()
            .map(|orbit| (orbit.pos.clone(), orbit.vel.clone()))
            .collect();
        PhaseSpacePosition::from_bodies(&bodies, self.unit_system()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};

    const SCENARIO: &str = r#"
units = "galactic"

[integrator]
name = "rk5"

[time]
dt = 0.5
n_steps = 2000

[potential.disk]
kind = "miyamoto_nagai"
parameters = { m = 6.0e10, a = 3.0, b = 0.28 }

[potential.halo]
kind = "nfw"
parameters = { m = 5.4e11, r_s = 15.0 }

[[orbits]]
pos = [8.0, 0.0, 0.0]
vel = [0.0, 0.22, 0.0]

[[orbits]]
pos = [10.0, 0.0, 0.5]
vel = [0.0, 0.2, 0.01]
"#;

    fn write_scenario(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_scenario() {
        let (_dir, path) = write_scenario(SCENARIO);
        let config = ScenarioConfig::load(&path).unwrap();

        assert_eq!(config.units, "galactic");
        assert_eq!(config.integrator.name, "rk5");
        assert_eq!(config.time, TimeSpec::steps(0.5, 2000));
        assert_eq!(config.orbits.len(), 2);

        let potential = config.build_potential().unwrap();
        assert_eq!(potential.ndim(), 3);
        assert_eq!(potential.units(), &UnitSystem::galactic());

        let w0 = config.initial_conditions().unwrap();
        assert_eq!(w0.norbits(), 2);
        assert_eq!(w0.pos()[[2, 1]], 0.5);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = ScenarioConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(error, Error::Config(ConfigError::ConfigLoad(_))));

        let fallback = ScenarioConfig::load_or_default(dir.path().join("absent.toml"));
        assert_eq!(fallback, ScenarioConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = ScenarioConfig::default();
        config.integrator.name = "leapfrog".to_string();
        config.save(&path).unwrap();

        assert_eq!(ScenarioConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_default_scenario_is_runnable() {
        let config = ScenarioConfig::default();
        assert!(config.build_potential().is_ok());
        assert!(config.initial_conditions().is_ok());
        assert!(config.time.resolve().is_ok());
        let integrator = config
            .integrator
            .build(&IntegratorRegistry::default())
            .unwrap();
        assert_eq!(integrator.name(), "dop853");
    }

    #[test]
    fn test_adaptive_settings_are_applied() {
        let settings = IntegratorConfig {
            name: "adaptive".to_string(),
            rtol: 1e-6,
            atol: 1e-8,
            ..Default::default()
        };
        let integrator = settings.build(&IntegratorRegistry::default()).unwrap();
        assert!(format!("{integrator:?}").contains("rtol: 1e-6"));

        let invalid = IntegratorConfig {
            rtol: -1.0,
            ..Default::default()
        };
        assert!(invalid.build(&IntegratorRegistry::default()).is_err());
    }

    #[test]
    fn test_unknown_names() {
        let settings = IntegratorConfig {
            name: "verlet".to_string(),
            ..Default::default()
        };
        let error = settings.build(&IntegratorRegistry::default()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);

        let config = ScenarioConfig {
            units: "imperial".to_string(),
            ..Default::default()
        };
        assert!(config.build_potential().is_err());
    }
}
