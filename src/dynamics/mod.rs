//! Phase-space containers
//!
//! [`PhaseSpacePosition`] holds initial conditions and [`Orbit`] holds the
//! integrated history. Both carry the [`UnitSystem`](crate::units::UnitSystem)
//! their numbers are expressed in.

mod orbit;
mod phase_space;

pub use orbit::Orbit;
pub use phase_space::PhaseSpacePosition;
