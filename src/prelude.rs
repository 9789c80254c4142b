//! galorbit prelude module
//!
//! This module re-exports the most commonly used types and traits to reduce
//! import boilerplate.

// Internal re-exports - Errors
pub use crate::error::{Error, ErrorKind, Result};

// Internal re-exports - Units
pub use crate::math::Scalar;
pub use crate::units::{Quantity, Unit, UnitSystem};

// Internal re-exports - Potentials
pub use crate::potential::{
    CompositePotential, HarmonicOscillatorPotential, HenonHeilesPotential, HernquistPotential,
    IsochronePotential, JaffePotential, KeplerPotential, LeeSutoTriaxialNFWPotential,
    LogarithmicPotential, LongMuraliBarPotential, MiyamotoNagaiPotential, NFWPotential,
    NullPotential, PlummerPotential, Potential, PotentialExt, PotentialSpec,
    PowerLawCutoffPotential, SatohPotential, StonePotential, Times, TriaxialNFWPotential,
};

// Internal re-exports - Dynamics
pub use crate::dynamics::{Orbit, PhaseSpacePosition};

// Internal re-exports - Integration
pub use crate::integrators::{
    Dop853, EquationOfMotion, FnEquation, Hamiltonian, Integrator, IntegratorRegistry, Leapfrog,
    MappedBuffer, OrbitIntegrator, OutputBuffer, ProgressObserver, RungeKutta, Silent, TimeSpec,
};

// Internal re-exports - Config
pub use crate::config::ScenarioConfig;
