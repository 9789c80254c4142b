//! Registry pattern for dynamic integrator management
//!
//! The registry serves as a discovery and factory mechanism for integrators.
//! Each integrator is self-describing, providing its own name, aliases, and
//! convergence order. The registry queries this metadata during registration
//! to build lookup tables for name resolution and instantiation.

use std::collections::{BTreeSet, HashMap};

use super::{Dop853, Integrator, Leapfrog, RungeKutta};
use crate::error::{ConfigError, Result};

/// Registry for runtime integrator registration
///
/// The registry keeps one prototype per name (canonical and aliases). When an
/// integrator is requested, the registry hands out a fresh copy via
/// `clone_box()`, so settings on a registered prototype (DOP853 tolerances,
/// a custom tableau) carry over to every instance created from it.
#[derive(Debug)]
pub struct IntegratorRegistry {
    /// Maps names (canonical and aliases) to integrator prototypes
    integrators: HashMap<String, Box<dyn Integrator>>,
}

impl IntegratorRegistry {
    /// Create an empty registry without any pre-registered integrators.
    pub fn new() -> Self {
        Self {
            integrators: HashMap::new(),
        }
    }

    /// Register all standard integrators with their default settings.
    ///
    /// Returns self for method chaining.
    pub fn with_standard_integrators(mut self) -> Self {
        self.register_integrator(Box::new(Leapfrog));
        self.register_integrator(Box::new(RungeKutta::rk4()));
        self.register_integrator(Box::new(RungeKutta::rk5()));
        self.register_integrator(Box::new(Dop853::default()));
        self
    }

    /// Register a single integrator.
    ///
    /// Returns self for method chaining.
    pub fn with_integrator(mut self, integrator: Box<dyn Integrator>) -> Self {
        self.register_integrator(integrator);
        self
    }

    /// Register `integrator` under its name and aliases, replacing any
    /// earlier entry with the same key
    pub fn register_integrator(&mut self, integrator: Box<dyn Integrator>) {
        for alias in integrator.aliases() {
            self.integrators
                .insert(alias.to_string(), integrator.clone_box());
        }
        self.integrators
            .insert(integrator.name().to_string(), integrator);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Integrator>> {
        self.integrators
            .get(name)
            .map(|integrator| integrator.clone_box())
            .ok_or_else(|| {
                let aliases: Vec<String> = self
                    .list_aliases()
                    .into_iter()
                    .map(|(alias, _)| alias)
                    .collect();
                ConfigError::UnknownIntegrator {
                    name: name.to_string(),
                    available: self.list_available().join(", "),
                    aliases: aliases.join(", "),
                }
                .into()
            })
    }

    /// Canonical name for `name`, which may be an alias
    pub fn resolve(&self, name: &str) -> Option<&'static str> {
        self.integrators.get(name).map(|integrator| integrator.name())
    }

    /// Sorted canonical names
    pub fn list_available(&self) -> Vec<String> {
        let canonical_names: BTreeSet<&str> = self
            .integrators
            .values()
            .map(|integrator| integrator.name())
            .collect();
        canonical_names.into_iter().map(str::to_string).collect()
    }

    /// Sorted `(alias, canonical name)` pairs
    pub fn list_aliases(&self) -> Vec<(String, String)> {
        let mut aliases: Vec<(String, String)> = self
            .integrators
            .iter()
            .filter(|(key, integrator)| key.as_str() != integrator.name())
            .map(|(key, integrator)| (key.clone(), integrator.name().to_string()))
            .collect();
        aliases.sort();
        aliases
    }
}

impl Default for IntegratorRegistry {
    fn default() -> Self {
        Self::new().with_standard_integrators()
    }
}
