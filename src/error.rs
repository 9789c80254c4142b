//! Error types for potential evaluation and orbit integration
//!
//! Errors fall into three families so callers can tell a usage mistake from
//! a numeric breakdown or a capability gap:
//!
//! - [`ConfigError`] - malformed input detected before any numeric work
//! - [`NumericError`] - a run that broke down while stepping
//! - [`UnsupportedError`] - an operation the target does not provide

use thiserror::Error;

/// Configuration mistakes, all detected before stepping starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid time specification: {0}")]
    TimeSpec(String),

    #[error("potential '{potential}' requires parameter '{name}'")]
    MissingParameter { potential: String, name: String },

    #[error("potential '{potential}' has no parameter named '{name}'")]
    UnknownParameter { potential: String, name: String },

    #[error("invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid potential frame: {0}")]
    InvalidFrame(String),

    #[error("unknown potential kind '{0}'")]
    UnknownPotential(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("output buffer has shape {actual:?}, expected {expected:?}")]
    BufferShape {
        expected: [usize; 3],
        actual: Vec<usize>,
    },

    #[error("output buffer is not writable")]
    BufferNotWritable,

    #[error("failed to map output buffer: {0}")]
    BufferMap(#[from] std::io::Error),

    #[error("progress reporting requires the `progress` feature (indicatif)")]
    ProgressUnavailable,

    #[error("unit error: {0}")]
    Units(String),

    #[error(
        "unknown integrator: '{name}'. Available integrators: {available}. Aliases: {aliases}"
    )]
    UnknownIntegrator {
        name: String,
        available: String,
        aliases: String,
    },

    #[error("failed to load configuration: {0}")]
    ConfigLoad(String),
}

/// Fatal numeric breakdowns during a run
#[derive(Debug, Error)]
pub enum NumericError {
    #[error("step size {step:e} underflowed at t = {t}")]
    StepSizeUnderflow { t: f64, step: f64 },

    #[error("exceeded the maximum of {max_steps} steps before t = {t_end}")]
    TooManySteps { max_steps: usize, t_end: f64 },

    #[error("non-finite state encountered at t = {t}")]
    NonFinite { t: f64 },
}

/// Capabilities a potential or integrator does not provide
#[derive(Debug, Error)]
pub enum UnsupportedError {
    #[error("Hessian is not implemented for rotated potentials ('{0}')")]
    RotatedHessian(String),

    #[error("potential '{0}' has no analytic density")]
    Density(String),

    #[error("{integrator} requires a separable Hamiltonian equation of motion")]
    NonSeparable { integrator: String },
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Numeric,
    Unsupported,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedError),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Config(ConfigError::BufferMap(error))
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::Numeric(_) => ErrorKind::Numeric,
            Error::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let config: Error = ConfigError::BufferNotWritable.into();
        assert_eq!(config.kind(), ErrorKind::Configuration);

        let numeric: Error = NumericError::NonFinite { t: 1.0 }.into();
        assert_eq!(numeric.kind(), ErrorKind::Numeric);

        let unsupported: Error = UnsupportedError::RotatedHessian("bar".into()).into();
        assert_eq!(unsupported.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_messages_name_the_problem() {
        let error = ConfigError::MissingParameter {
            potential: "kepler".into(),
            name: "m".into(),
        };
        assert_eq!(error.to_string(), "potential 'kepler' requires parameter 'm'");

        let error = ConfigError::BufferShape {
            expected: [2, 11, 3],
            actual: vec![2, 10, 3],
        };
        assert!(error.to_string().contains("[2, 11, 3]"));
    }
}
