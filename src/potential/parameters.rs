//! Potential parameters tagged with physical dimensions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::math::{MAX_NDIM, Scalar};
use crate::units::{Dimension, Quantity, UnitSystem};

/// A resolved parameter value in the owning potential's units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Scalar(Scalar),
    Vector(Vec<Scalar>),
}

impl ParameterValue {
    fn len(&self) -> usize {
        match self {
            ParameterValue::Scalar(_) => 1,
            ParameterValue::Vector(values) => values.len(),
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            ParameterValue::Scalar(value) => value.is_finite(),
            ParameterValue::Vector(values) => values.iter().all(|v| v.is_finite()),
        }
    }

    fn scaled(&self, factor: Scalar) -> ParameterValue {
        match self {
            ParameterValue::Scalar(value) => ParameterValue::Scalar(value * factor),
            ParameterValue::Vector(values) => {
                ParameterValue::Vector(values.iter().map(|v| v * factor).collect())
            }
        }
    }
}

impl From<Scalar> for ParameterValue {
    fn from(value: Scalar) -> Self {
        ParameterValue::Scalar(value)
    }
}

impl From<Vec<Scalar>> for ParameterValue {
    fn from(values: Vec<Scalar>) -> Self {
        ParameterValue::Vector(values)
    }
}

/// Caller input for a parameter: a bare number in the potential's units, or a
/// quantity in any unit
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterInput {
    Value(ParameterValue),
    Quantity(Quantity),
}

impl From<Scalar> for ParameterInput {
    fn from(value: Scalar) -> Self {
        ParameterInput::Value(ParameterValue::Scalar(value))
    }
}

impl From<Vec<Scalar>> for ParameterInput {
    fn from(values: Vec<Scalar>) -> Self {
        ParameterInput::Value(ParameterValue::Vector(values))
    }
}

impl<const N: usize> From<[Scalar; N]> for ParameterInput {
    fn from(values: [Scalar; N]) -> Self {
        ParameterInput::Value(ParameterValue::Vector(values.to_vec()))
    }
}

impl From<ParameterValue> for ParameterInput {
    fn from(value: ParameterValue) -> Self {
        ParameterInput::Value(value)
    }
}

impl From<Quantity> for ParameterInput {
    fn from(quantity: Quantity) -> Self {
        ParameterInput::Quantity(quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterShape {
    Scalar,
    /// One value per spatial axis; a scalar input is broadcast
    PerAxis,
}

/// Declares one parameter a potential family accepts
#[derive(Debug, Clone, Copy)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub dimension: Dimension,
    pub shape: ParameterShape,
    /// Used when the caller leaves the parameter out; required if `None`
    pub default: Option<Scalar>,
}

impl ParameterSpec {
    pub const fn scalar(name: &'static str, dimension: Dimension) -> Self {
        Self {
            name,
            dimension,
            shape: ParameterShape::Scalar,
            default: None,
        }
    }

    pub const fn per_axis(name: &'static str, dimension: Dimension) -> Self {
        Self {
            name,
            dimension,
            shape: ParameterShape::PerAxis,
            default: None,
        }
    }

    pub const fn with_default(mut self, value: Scalar) -> Self {
        self.default = Some(value);
        self
    }
}

/// How a potential family decides its spatial dimensionality
#[derive(Debug, Clone, Copy)]
pub enum Dimensionality {
    Fixed(usize),
    /// Any dimensionality up to [`MAX_NDIM`], three unless requested
    Any,
    /// The length of the named per-axis parameter
    FromParameter(&'static str),
}

impl Dimensionality {
    pub(crate) fn resolve(
        &self,
        potential: &str,
        requested: Option<usize>,
        inputs: &BTreeMap<String, ParameterInput>,
    ) -> Result<usize> {
        let ndim = match *self {
            Dimensionality::Fixed(n) => n,
            Dimensionality::Any => requested.unwrap_or(3),
            Dimensionality::FromParameter(name) => match inputs.get(name) {
                Some(ParameterInput::Value(value)) => value.len(),
                Some(ParameterInput::Quantity(_)) => 1,
                None => {
                    return Err(ConfigError::MissingParameter {
                        potential: potential.to_string(),
                        name: name.to_string(),
                    }
                    .into());
                }
            },
        };

        if let Some(requested) = requested {
            if requested != ndim {
                return Err(ConfigError::Shape(format!(
                    "potential '{potential}' is {ndim}-dimensional, {requested} requested"
                ))
                .into());
            }
        }
        if ndim == 0 || ndim > MAX_NDIM {
            return Err(ConfigError::Shape(format!(
                "potential '{potential}' supports 1 to {MAX_NDIM} dimensions, got {ndim}"
            ))
            .into());
        }
        Ok(ndim)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub value: ParameterValue,
    pub dimension: Dimension,
}

/// The validated parameters of one potential
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    values: BTreeMap<String, Parameter>,
}

impl ParameterSet {
    /// Check `inputs` against `specs` and express every value in `units`.
    ///
    /// Every declared parameter without a default must be present, and
    /// nothing undeclared may be.
    pub fn resolve(
        potential: &str,
        specs: &[ParameterSpec],
        mut inputs: BTreeMap<String, ParameterInput>,
        ndim: usize,
        units: &UnitSystem,
    ) -> Result<Self> {
        let mut values = BTreeMap::new();

        for spec in specs {
            let input = match (inputs.remove(spec.name), spec.default) {
                (Some(input), _) => input,
                (None, Some(default)) => ParameterInput::from(default),
                (None, None) => {
                    return Err(ConfigError::MissingParameter {
                        potential: potential.to_string(),
                        name: spec.name.to_string(),
                    }
                    .into());
                }
            };

            let value = match input {
                ParameterInput::Value(value) => value,
                ParameterInput::Quantity(quantity) => {
                    if quantity.dimension() != spec.dimension {
                        return Err(invalid(
                            spec.name,
                            format!("'{}' has the wrong dimension", quantity.unit),
                        ));
                    }
                    ParameterValue::Scalar(units.decompose(&quantity)?)
                }
            };

            let value = match (spec.shape, value) {
                (ParameterShape::Scalar, ParameterValue::Vector(_)) => {
                    return Err(invalid(spec.name, "expected a scalar".to_string()));
                }
                (ParameterShape::PerAxis, ParameterValue::Scalar(v)) => {
                    ParameterValue::Vector(vec![v; ndim])
                }
                (ParameterShape::PerAxis, ParameterValue::Vector(v)) if v.len() != ndim => {
                    return Err(invalid(
                        spec.name,
                        format!("expected {ndim} values, got {}", v.len()),
                    ));
                }
                (_, value) => value,
            };

            if !value.is_finite() {
                return Err(invalid(spec.name, "value is not finite".to_string()));
            }

            values.insert(
                spec.name.to_string(),
                Parameter {
                    value,
                    dimension: spec.dimension,
                },
            );
        }

        if let Some(name) = inputs.into_keys().next() {
            return Err(ConfigError::UnknownParameter {
                potential: potential.to_string(),
                name,
            }
            .into());
        }

        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.values.get(name)
    }

    pub fn scalar(&self, name: &str) -> Result<Scalar> {
        match self.values.get(name).map(|p| &p.value) {
            Some(ParameterValue::Scalar(value)) => Ok(*value),
            Some(ParameterValue::Vector(_)) => {
                Err(invalid(name, "expected a scalar".to_string()))
            }
            None => Err(invalid(name, "not present".to_string())),
        }
    }

    pub fn vector(&self, name: &str) -> Result<&[Scalar]> {
        match self.values.get(name).map(|p| &p.value) {
            Some(ParameterValue::Vector(values)) => Ok(values),
            Some(ParameterValue::Scalar(_)) => {
                Err(invalid(name, "expected a vector".to_string()))
            }
            None => Err(invalid(name, "not present".to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The same parameters re-expressed from `from` into `to`
    pub fn converted(&self, from: &UnitSystem, to: &UnitSystem) -> ParameterSet {
        let values = self
            .values
            .iter()
            .map(|(name, p)| {
                let factor = from.conversion_factor(p.dimension, to);
                (
                    name.clone(),
                    Parameter {
                        value: p.value.scaled(factor),
                        dimension: p.dimension,
                    },
                )
            })
            .collect();
        ParameterSet { values }
    }
}

fn invalid(name: &str, reason: String) -> crate::error::Error {
    ConfigError::InvalidParameter {
        name: name.to_string(),
        reason,
    }
    .into()
}
