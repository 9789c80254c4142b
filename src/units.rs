//! Unit systems and physical quantities
//!
//! Every number that reaches a numeric kernel is expressed in the base units
//! of one [`UnitSystem`]. Conversion happens at the edges: parameters are
//! decomposed when a potential is built, positions are converted when a
//! [`PhaseSpacePosition`](crate::dynamics::PhaseSpacePosition) is flattened,
//! and orbits carry the system they were integrated in.

use std::borrow::Cow;
use std::fmt;
use std::ops::{Div, Mul};

use crate::error::{ConfigError, Result};
use crate::math::Scalar;

/// Gravitational constant in SI units (CODATA 2018)
pub const G_SI: Scalar = 6.674_30e-11;

/// Exponents of the four base dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimension {
    pub length: i8,
    pub time: i8,
    pub mass: i8,
    pub angle: i8,
}

impl Dimension {
    pub const NONE: Dimension = Dimension::new(0, 0, 0, 0);
    pub const LENGTH: Dimension = Dimension::new(1, 0, 0, 0);
    pub const TIME: Dimension = Dimension::new(0, 1, 0, 0);
    pub const MASS: Dimension = Dimension::new(0, 0, 1, 0);
    pub const ANGLE: Dimension = Dimension::new(0, 0, 0, 1);
    pub const FREQUENCY: Dimension = Dimension::new(0, -1, 0, 0);
    pub const VELOCITY: Dimension = Dimension::new(1, -1, 0, 0);
    pub const ACCELERATION: Dimension = Dimension::new(1, -2, 0, 0);
    /// Specific energy, the dimension of a potential value
    pub const ENERGY: Dimension = Dimension::new(2, -2, 0, 0);
    pub const DENSITY: Dimension = Dimension::new(-3, 0, 1, 0);

    pub const fn new(length: i8, time: i8, mass: i8, angle: i8) -> Self {
        Self {
            length,
            time,
            mass,
            angle,
        }
    }

    pub const fn mul(self, other: Dimension) -> Dimension {
        Dimension::new(
            self.length + other.length,
            self.time + other.time,
            self.mass + other.mass,
            self.angle + other.angle,
        )
    }

    pub const fn div(self, other: Dimension) -> Dimension {
        Dimension::new(
            self.length - other.length,
            self.time - other.time,
            self.mass - other.mass,
            self.angle - other.angle,
        )
    }

    pub fn is_none(&self) -> bool {
        *self == Dimension::NONE
    }
}

/// A physical unit: a dimension and its size in SI
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    symbol: Cow<'static, str>,
    dimension: Dimension,
    si_scale: Scalar,
}

impl Unit {
    pub const fn base(symbol: &'static str, dimension: Dimension, si_scale: Scalar) -> Self {
        Self {
            symbol: Cow::Borrowed(symbol),
            dimension,
            si_scale,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn si_scale(&self) -> Scalar {
        self.si_scale
    }

    pub fn powi(&self, n: i32) -> Unit {
        let exp = n as i8;
        Unit {
            symbol: Cow::Owned(format!("{}^{n}", self.symbol)),
            dimension: Dimension::new(
                self.dimension.length * exp,
                self.dimension.time * exp,
                self.dimension.mass * exp,
                self.dimension.angle * exp,
            ),
            si_scale: libm::pow(self.si_scale, n as Scalar),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

impl Mul for Unit {
    type Output = Unit;

    fn mul(self, rhs: Unit) -> Unit {
        Unit {
            symbol: Cow::Owned(format!("{} {}", self.symbol, rhs.symbol)),
            dimension: self.dimension.mul(rhs.dimension),
            si_scale: self.si_scale * rhs.si_scale,
        }
    }
}

impl Div for Unit {
    type Output = Unit;

    fn div(self, rhs: Unit) -> Unit {
        Unit {
            symbol: Cow::Owned(format!("{} / {}", self.symbol, rhs.symbol)),
            dimension: self.dimension.div(rhs.dimension),
            si_scale: self.si_scale / rhs.si_scale,
        }
    }
}

impl Mul<Unit> for Scalar {
    type Output = Quantity;

    fn mul(self, unit: Unit) -> Quantity {
        Quantity::new(self, unit)
    }
}

pub const ONE: Unit = Unit::base("", Dimension::NONE, 1.0);

pub const M: Unit = Unit::base("m", Dimension::LENGTH, 1.0);
pub const KM: Unit = Unit::base("km", Dimension::LENGTH, 1.0e3);
pub const AU: Unit = Unit::base("AU", Dimension::LENGTH, 1.495_978_707e11);
pub const PC: Unit = Unit::base("pc", Dimension::LENGTH, 3.085_677_581_491_367e16);
pub const KPC: Unit = Unit::base("kpc", Dimension::LENGTH, 3.085_677_581_491_367e19);

pub const S: Unit = Unit::base("s", Dimension::TIME, 1.0);
pub const YR: Unit = Unit::base("yr", Dimension::TIME, 3.155_76e7);
pub const MYR: Unit = Unit::base("Myr", Dimension::TIME, 3.155_76e13);

pub const KG: Unit = Unit::base("kg", Dimension::MASS, 1.0);
pub const MJUP: Unit = Unit::base("Mjup", Dimension::MASS, 1.898_124_597_336_050_5e27);
pub const MSUN: Unit = Unit::base("Msun", Dimension::MASS, 1.988_409_870_698_051e30);

pub const RAD: Unit = Unit::base("rad", Dimension::ANGLE, 1.0);
pub const DEG: Unit = Unit::base("deg", Dimension::ANGLE, std::f64::consts::PI / 180.0);

/// A value attached to a unit
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: Scalar,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: Scalar, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn dimension(&self) -> Dimension {
        self.unit.dimension()
    }

    /// Re-express in another unit of the same dimension
    pub fn to(&self, unit: &Unit) -> Result<Scalar> {
        if unit.dimension() != self.unit.dimension() {
            return Err(ConfigError::Units(format!(
                "cannot convert '{}' to '{}'",
                self.unit, unit
            ))
            .into());
        }
        Ok(self.value * self.unit.si_scale() / unit.si_scale())
    }
}

/// Base units for length, time, mass and angle, or the identity system
#[derive(Debug, Clone, PartialEq)]
pub enum UnitSystem {
    /// Every quantity is a bare number
    Dimensionless,
    Physical {
        length: Unit,
        time: Unit,
        mass: Unit,
        angle: Unit,
    },
}

impl Default for UnitSystem {
    fn default() -> Self {
        UnitSystem::Dimensionless
    }
}

impl UnitSystem {
    pub fn new(length: Unit, time: Unit, mass: Unit, angle: Unit) -> Result<Self> {
        let expected = [
            (&length, Dimension::LENGTH, "length"),
            (&time, Dimension::TIME, "time"),
            (&mass, Dimension::MASS, "mass"),
            (&angle, Dimension::ANGLE, "angle"),
        ];
        for (unit, dimension, label) in expected {
            if unit.dimension() != dimension {
                return Err(
                    ConfigError::Units(format!("'{unit}' is not a {label} unit")).into(),
                );
            }
        }
        Ok(UnitSystem::Physical {
            length,
            time,
            mass,
            angle,
        })
    }

    pub fn dimensionless() -> Self {
        UnitSystem::Dimensionless
    }

    /// kpc, Myr, Msun, radian
    pub fn galactic() -> Self {
        UnitSystem::Physical {
            length: KPC,
            time: MYR,
            mass: MSUN,
            angle: RAD,
        }
    }

    /// AU, yr, Msun, radian
    pub fn solar_system() -> Self {
        UnitSystem::Physical {
            length: AU,
            time: YR,
            mass: MSUN,
            angle: RAD,
        }
    }

    /// Resolve a preset by name, as used in configuration files
    pub fn from_preset(name: &str) -> Result<Self> {
        match name {
            "galactic" => Ok(Self::galactic()),
            "solar_system" | "solarsystem" => Ok(Self::solar_system()),
            "dimensionless" | "none" => Ok(Self::dimensionless()),
            other => Err(ConfigError::Units(format!("unknown unit system '{other}'")).into()),
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        matches!(self, UnitSystem::Dimensionless)
    }

    /// SI size of this system's unit for `dimension`
    pub fn si_scale(&self, dimension: Dimension) -> Scalar {
        match self {
            UnitSystem::Dimensionless => 1.0,
            UnitSystem::Physical {
                length,
                time,
                mass,
                angle,
            } => {
                libm::pow(length.si_scale(), dimension.length as Scalar)
                    * libm::pow(time.si_scale(), dimension.time as Scalar)
                    * libm::pow(mass.si_scale(), dimension.mass as Scalar)
                    * libm::pow(angle.si_scale(), dimension.angle as Scalar)
            }
        }
    }

    /// The unit this system uses for `dimension`, for labeling output
    pub fn unit_for(&self, dimension: Dimension) -> Unit {
        match self {
            UnitSystem::Dimensionless => ONE,
            UnitSystem::Physical {
                length,
                time,
                mass,
                angle,
            } => {
                let mut unit = ONE;
                for (base, exp) in [
                    (length, dimension.length),
                    (time, dimension.time),
                    (mass, dimension.mass),
                    (angle, dimension.angle),
                ] {
                    if exp != 0 {
                        let factor = if exp == 1 {
                            base.clone()
                        } else {
                            base.powi(exp as i32)
                        };
                        unit = if unit.symbol().is_empty() {
                            factor
                        } else {
                            unit * factor
                        };
                    }
                }
                unit
            }
        }
    }

    /// Express a quantity as a bare number in this system
    pub fn decompose(&self, quantity: &Quantity) -> Result<Scalar> {
        match self {
            UnitSystem::Dimensionless if !quantity.dimension().is_none() => {
                Err(ConfigError::Units(format!(
                    "cannot decompose '{}' into a dimensionless unit system",
                    quantity.unit
                ))
                .into())
            }
            _ => Ok(quantity.value * quantity.unit.si_scale() / self.si_scale(quantity.dimension())),
        }
    }

    /// Factor that converts a bare `dimension` value from `self` to `to`.
    ///
    /// Conversions touching the dimensionless system are the identity.
    pub fn conversion_factor(&self, dimension: Dimension, to: &UnitSystem) -> Scalar {
        if self.is_dimensionless() || to.is_dimensionless() || self == to {
            1.0
        } else {
            self.si_scale(dimension) / to.si_scale(dimension)
        }
    }

    pub fn convert(&self, value: Scalar, dimension: Dimension, to: &UnitSystem) -> Scalar {
        value * self.conversion_factor(dimension, to)
    }

    /// Newton's G in this system's base units
    pub fn gravitational_constant(&self) -> Scalar {
        match self {
            UnitSystem::Dimensionless => 1.0,
            _ => G_SI / self.si_scale(Dimension::new(3, -2, -1, 0)),
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSystem::Dimensionless => f.write_str("dimensionless"),
            UnitSystem::Physical {
                length,
                time,
                mass,
                angle,
            } => write!(f, "({length}, {time}, {mass}, {angle})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gravitational_constant_in_presets() {
        assert_relative_eq!(
            UnitSystem::galactic().gravitational_constant(),
            4.498_502_151_469_554e-12,
            max_relative = 1e-6
        );
        // Kepler's third law in AU and years: G Msun ≈ 4π²
        assert_relative_eq!(
            UnitSystem::solar_system().gravitational_constant(),
            4.0 * std::f64::consts::PI * std::f64::consts::PI,
            max_relative = 1e-3
        );
        assert_eq!(UnitSystem::dimensionless().gravitational_constant(), 1.0);
    }

    #[test]
    fn test_decompose_velocity() {
        let usys = UnitSystem::galactic();
        let v = 220.0 * (KM / S);
        let kpc_per_myr = usys.decompose(&v).unwrap();
        assert_relative_eq!(kpc_per_myr, 0.224_996, max_relative = 1e-4);
    }

    #[test]
    fn test_decompose_mass_between_units() {
        let usys = UnitSystem::solar_system();
        let one_sun_in_jupiters = Quantity::new(1.0, MSUN).to(&MJUP).unwrap();
        let q = one_sun_in_jupiters * MJUP;
        assert_relative_eq!(usys.decompose(&q).unwrap(), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_dimensionless_rejects_dimensional_quantities() {
        let usys = UnitSystem::dimensionless();
        assert!(usys.decompose(&(1.0 * KPC)).is_err());
        assert_eq!(usys.decompose(&(2.5 * ONE)).unwrap(), 2.5);
    }

    #[test]
    fn test_conversion_between_systems() {
        let galactic = UnitSystem::galactic();
        let solar = UnitSystem::solar_system();
        let one_kpc_in_au = galactic.convert(1.0, Dimension::LENGTH, &solar);
        assert_relative_eq!(one_kpc_in_au, 2.062_648e8, max_relative = 1e-6);
        assert_eq!(
            galactic.convert(3.0, Dimension::LENGTH, &UnitSystem::dimensionless()),
            3.0
        );
    }

    #[test]
    fn test_unit_labels() {
        let usys = UnitSystem::galactic();
        assert_eq!(usys.unit_for(Dimension::LENGTH).symbol(), "kpc");
        assert_eq!(usys.unit_for(Dimension::VELOCITY).symbol(), "kpc Myr^-1");
        assert_eq!(
            UnitSystem::dimensionless().unit_for(Dimension::VELOCITY).symbol(),
            ""
        );
    }

    #[test]
    fn test_new_validates_dimensions() {
        assert!(UnitSystem::new(KPC, MYR, MSUN, RAD).is_ok());
        assert!(UnitSystem::new(MYR, KPC, MSUN, RAD).is_err());
    }
}
