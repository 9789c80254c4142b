//! galorbit library
//!
//! Orbit integration for test particles in analytic and composite
//! gravitational potentials. The binary is a thin driver over
//! [`config::ScenarioConfig`] and [`integrators::OrbitIntegrator`].

pub mod cli;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod integrators;
pub mod math;
pub mod potential;
pub mod prelude;
pub mod units;
