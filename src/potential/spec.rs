//! Building potentials by kind name, for configuration files

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::Potential;
use super::analytic::{Analytic, PotentialKernel};
use super::builtin::{
    HarmonicOscillator, HenonHeiles, Hernquist, Isochrone, Jaffe, Kepler, LeeSutoTriaxialNfw,
    Logarithmic, LongMuraliBar, MiyamotoNagai, Nfw, Null, Plummer, PowerLawCutoff,
    RadialProfile, Satoh, Spherical, Stone, TriaxialNfw,
};
use super::parameters::{ParameterInput, ParameterValue};
use crate::error::{ConfigError, Result};
use crate::math::Scalar;
use crate::units::UnitSystem;

/// Every kind key [`PotentialSpec::build`] understands
pub const POTENTIAL_KINDS: &[&str] = &[
    Null::NAME,
    HarmonicOscillator::NAME,
    Kepler::NAME,
    Isochrone::NAME,
    Hernquist::NAME,
    Plummer::NAME,
    Jaffe::NAME,
    Nfw::NAME,
    Stone::NAME,
    PowerLawCutoff::NAME,
    TriaxialNfw::NAME,
    LeeSutoTriaxialNfw::NAME,
    MiyamotoNagai::NAME,
    Satoh::NAME,
    Logarithmic::NAME,
    LongMuraliBar::NAME,
    HenonHeiles::NAME,
];

/// A potential described by kind and bare parameter values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PotentialSpec {
    pub kind: String,
    pub parameters: BTreeMap<String, ParameterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Vec<Scalar>>,
    /// Rows of the rotation matrix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec<Vec<Scalar>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndim: Option<usize>,
}

impl PotentialSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<ParameterValue>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// Build the potential with parameters read as bare numbers in `units`
    pub fn build(&self, units: &UnitSystem) -> Result<Arc<dyn Potential>> {
        let kind = self.kind.as_str();
        if kind == Null::NAME {
            self.build_kernel::<Null>(units)
        } else if kind == HarmonicOscillator::NAME {
            self.build_kernel::<HarmonicOscillator>(units)
        } else if kind == Spherical::<Kepler>::NAME {
            self.build_kernel::<Spherical<Kepler>>(units)
        } else if kind == Spherical::<Isochrone>::NAME {
            self.build_kernel::<Spherical<Isochrone>>(units)
        } else if kind == Spherical::<Hernquist>::NAME {
            self.build_kernel::<Spherical<Hernquist>>(units)
        } else if kind == Spherical::<Plummer>::NAME {
            self.build_kernel::<Spherical<Plummer>>(units)
        } else if kind == Spherical::<Jaffe>::NAME {
            self.build_kernel::<Spherical<Jaffe>>(units)
        } else if kind == Spherical::<Nfw>::NAME {
            self.build_kernel::<Spherical<Nfw>>(units)
        } else if kind == Spherical::<Stone>::NAME {
            self.build_kernel::<Spherical<Stone>>(units)
        } else if kind == Spherical::<PowerLawCutoff>::NAME {
            self.build_kernel::<Spherical<PowerLawCutoff>>(units)
        } else if kind == TriaxialNfw::NAME {
            self.build_kernel::<TriaxialNfw>(units)
        } else if kind == LeeSutoTriaxialNfw::NAME {
            self.build_kernel::<LeeSutoTriaxialNfw>(units)
        } else if kind == MiyamotoNagai::NAME {
            self.build_kernel::<MiyamotoNagai>(units)
        } else if kind == Satoh::NAME {
            self.build_kernel::<Satoh>(units)
        } else if kind == Logarithmic::NAME {
            self.build_kernel::<Logarithmic>(units)
        } else if kind == LongMuraliBar::NAME {
            self.build_kernel::<LongMuraliBar>(units)
        } else if kind == HenonHeiles::NAME {
            self.build_kernel::<HenonHeiles>(units)
        } else {
            Err(ConfigError::UnknownPotential(self.kind.clone()).into())
        }
    }

    fn build_kernel<K: PotentialKernel>(&self, units: &UnitSystem) -> Result<Arc<dyn Potential>> {
        let mut builder = Analytic::<K>::builder().units(units.clone());
        for (name, value) in &self.parameters {
            builder = builder.parameter(name, ParameterInput::Value(value.clone()));
        }
        if let Some(ndim) = self.ndim {
            builder = builder.ndim(ndim);
        }
        if let Some(origin) = &self.origin {
            builder = builder.origin(origin.clone());
        }
        if let Some(rows) = &self.rotation {
            builder = builder.rotation(rotation_matrix(rows)?);
        }
        Ok(Arc::new(builder.build()?))
    }
}

fn rotation_matrix(rows: &[Vec<Scalar>]) -> Result<Array2<Scalar>> {
    let n = rows.len();
    if rows.iter().any(|row| row.len() != n) {
        return Err(ConfigError::InvalidFrame("rotation must be a square matrix".into()).into());
    }
    let flat: Vec<Scalar> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((n, n), flat)
        .map_err(|e| ConfigError::InvalidFrame(e.to_string()).into())
}
