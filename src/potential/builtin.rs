//! Built-in analytic families
//!
//! Spherical families only describe their radial profile `Φ(r)` and its
//! first two derivatives; [`Spherical`] turns that into gradients and
//! Hessians. The remaining families implement [`PotentialKernel`] directly.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;

use super::analytic::{Analytic, PotentialKernel};
use super::parameters::{Dimensionality, ParameterInput, ParameterSet, ParameterSpec};
use crate::error::{ConfigError, Result};
use crate::math::{Scalar, dot, gamma_p, upper_gamma};
use crate::units::{Dimension, UnitSystem};

pub type NullPotential = Analytic<Null>;
pub type HarmonicOscillatorPotential = Analytic<HarmonicOscillator>;
pub type HenonHeilesPotential = Analytic<HenonHeiles>;
pub type KeplerPotential = Analytic<Spherical<Kepler>>;
pub type IsochronePotential = Analytic<Spherical<Isochrone>>;
pub type HernquistPotential = Analytic<Spherical<Hernquist>>;
pub type PlummerPotential = Analytic<Spherical<Plummer>>;
pub type JaffePotential = Analytic<Spherical<Jaffe>>;
pub type NFWPotential = Analytic<Spherical<Nfw>>;
pub type MiyamotoNagaiPotential = Analytic<MiyamotoNagai>;
pub type LogarithmicPotential = Analytic<Logarithmic>;
pub type SatohPotential = Analytic<Satoh>;
pub type StonePotential = Analytic<Spherical<Stone>>;
pub type PowerLawCutoffPotential = Analytic<Spherical<PowerLawCutoff>>;
pub type TriaxialNFWPotential = Analytic<TriaxialNfw>;
pub type LeeSutoTriaxialNFWPotential = Analytic<LeeSutoTriaxialNfw>;
pub type LongMuraliBarPotential = Analytic<LongMuraliBar>;

const MASS: ParameterSpec = ParameterSpec::scalar("m", Dimension::MASS);

/// A spherically symmetric potential `Φ(r)`
pub trait RadialProfile: Sized + Send + Sync + fmt::Debug + 'static {
    const NAME: &'static str;
    const PARAMETERS: &'static [ParameterSpec];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self>;

    fn phi(&self, r: Scalar) -> Scalar;

    fn dphi(&self, r: Scalar) -> Scalar;

    fn d2phi(&self, r: Scalar) -> Scalar;

    /// `∇²Φ` in `ndim` dimensions
    fn laplacian(&self, r: Scalar, ndim: usize) -> Scalar {
        if r == 0.0 {
            ndim as Scalar * self.d2phi(0.0)
        } else {
            self.d2phi(r) + (ndim as Scalar - 1.0) * self.dphi(r) / r
        }
    }
}

/// Adapts a [`RadialProfile`] to [`PotentialKernel`].
///
/// With `u = q/r`: `∇Φ = Φ' u` and `H = Φ'' uuᵀ + (Φ'/r)(I − uuᵀ)`.
/// At the center the gradient is zero and `H = Φ''(0) I`.
#[derive(Debug, Clone)]
pub struct Spherical<P>(pub P);

impl<P: RadialProfile> PotentialKernel for Spherical<P> {
    const NAME: &'static str = P::NAME;
    const PARAMETERS: &'static [ParameterSpec] = P::PARAMETERS;

    fn from_parameters(parameters: &ParameterSet, _ndim: usize, g: Scalar) -> Result<Self> {
        P::from_parameters(parameters, g).map(Spherical)
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        self.0.phi(libm::sqrt(dot(q, q)))
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let r = libm::sqrt(dot(q, q));
        if r == 0.0 {
            out.fill(0.0);
            return;
        }
        let scale = self.0.dphi(r) / r;
        for (o, x) in out.iter_mut().zip(q) {
            *o = scale * x;
        }
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let n = q.len();
        let r = libm::sqrt(dot(q, q));
        if r == 0.0 {
            let d2 = self.0.d2phi(0.0);
            for k in 0..n {
                for l in 0..n {
                    out[k * n + l] = if k == l { d2 } else { 0.0 };
                }
            }
            return;
        }

        let radial = self.0.d2phi(r);
        let tangential = self.0.dphi(r) / r;
        for k in 0..n {
            for l in 0..n {
                let uu = q[k] * q[l] / (r * r);
                let delta = if k == l { 1.0 } else { 0.0 };
                out[k * n + l] = radial * uu + tangential * (delta - uu);
            }
        }
    }

    fn laplacian(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        self.0.laplacian(libm::sqrt(dot(q, q)), q.len())
    }
}

/// Point mass, `Φ = −GM/r`
#[derive(Debug, Clone)]
pub struct Kepler {
    gm: Scalar,
}

impl RadialProfile for Kepler {
    const NAME: &'static str = "kepler";
    const PARAMETERS: &'static [ParameterSpec] = &[MASS];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self> {
        Ok(Self {
            gm: g * parameters.scalar("m")?,
        })
    }

    fn phi(&self, r: Scalar) -> Scalar {
        -self.gm / r
    }

    fn dphi(&self, r: Scalar) -> Scalar {
        self.gm / (r * r)
    }

    fn d2phi(&self, r: Scalar) -> Scalar {
        -2.0 * self.gm / (r * r * r)
    }

    /// All of the mass sits at the center
    fn laplacian(&self, _r: Scalar, _ndim: usize) -> Scalar {
        0.0
    }
}

/// `Φ = −GM / (b + √(r² + b²))`
#[derive(Debug, Clone)]
pub struct Isochrone {
    gm: Scalar,
    b: Scalar,
}

impl RadialProfile for Isochrone {
    const NAME: &'static str = "isochrone";
    const PARAMETERS: &'static [ParameterSpec] =
        &[MASS, ParameterSpec::scalar("b", Dimension::LENGTH)];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self> {
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            b: parameters.scalar("b")?,
        })
    }

    fn phi(&self, r: Scalar) -> Scalar {
        let s = libm::hypot(r, self.b);
        -self.gm / (self.b + s)
    }

    fn dphi(&self, r: Scalar) -> Scalar {
        let s = libm::hypot(r, self.b);
        let bs = self.b + s;
        self.gm * r / (s * bs * bs)
    }

    fn d2phi(&self, r: Scalar) -> Scalar {
        let s = libm::hypot(r, self.b);
        let bs = self.b + s;
        let r2 = r * r;
        self.gm
            * (1.0 / (s * bs * bs) - r2 / (s * s * s * bs * bs) - 2.0 * r2 / (s * s * bs * bs * bs))
    }
}

/// `Φ = −GM / (r + c)`
#[derive(Debug, Clone)]
pub struct Hernquist {
    gm: Scalar,
    c: Scalar,
}

impl RadialProfile for Hernquist {
    const NAME: &'static str = "hernquist";
    const PARAMETERS: &'static [ParameterSpec] =
        &[MASS, ParameterSpec::scalar("c", Dimension::LENGTH)];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self> {
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            c: parameters.scalar("c")?,
        })
    }

    fn phi(&self, r: Scalar) -> Scalar {
        -self.gm / (r + self.c)
    }

    fn dphi(&self, r: Scalar) -> Scalar {
        let rc = r + self.c;
        self.gm / (rc * rc)
    }

    fn d2phi(&self, r: Scalar) -> Scalar {
        let rc = r + self.c;
        -2.0 * self.gm / (rc * rc * rc)
    }
}

/// `Φ = −GM / √(r² + b²)`
#[derive(Debug, Clone)]
pub struct Plummer {
    gm: Scalar,
    b: Scalar,
}

impl RadialProfile for Plummer {
    const NAME: &'static str = "plummer";
    const PARAMETERS: &'static [ParameterSpec] =
        &[MASS, ParameterSpec::scalar("b", Dimension::LENGTH)];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self> {
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            b: parameters.scalar("b")?,
        })
    }

    fn phi(&self, r: Scalar) -> Scalar {
        -self.gm / libm::hypot(r, self.b)
    }

    fn dphi(&self, r: Scalar) -> Scalar {
        let s2 = r * r + self.b * self.b;
        self.gm * r / (s2 * libm::sqrt(s2))
    }

    fn d2phi(&self, r: Scalar) -> Scalar {
        let s2 = r * r + self.b * self.b;
        self.gm * (self.b * self.b - 2.0 * r * r) / (s2 * s2 * libm::sqrt(s2))
    }
}

/// `Φ = (GM/c) ln(r / (r + c))`
#[derive(Debug, Clone)]
pub struct Jaffe {
    gm: Scalar,
    c: Scalar,
}

impl RadialProfile for Jaffe {
    const NAME: &'static str = "jaffe";
    const PARAMETERS: &'static [ParameterSpec] =
        &[MASS, ParameterSpec::scalar("c", Dimension::LENGTH)];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self> {
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            c: parameters.scalar("c")?,
        })
    }

    fn phi(&self, r: Scalar) -> Scalar {
        self.gm / self.c * libm::log(r / (r + self.c))
    }

    fn dphi(&self, r: Scalar) -> Scalar {
        self.gm / (r * (r + self.c))
    }

    fn d2phi(&self, r: Scalar) -> Scalar {
        let rc = r + self.c;
        -self.gm * (2.0 * r + self.c) / (r * r * rc * rc)
    }
}

/// Spherical NFW halo, `Φ = −GM ln(1 + r/r_s) / r`
#[derive(Debug, Clone)]
pub struct Nfw {
    gm: Scalar,
    r_s: Scalar,
}

impl RadialProfile for Nfw {
    const NAME: &'static str = "nfw";
    const PARAMETERS: &'static [ParameterSpec] =
        &[MASS, ParameterSpec::scalar("r_s", Dimension::LENGTH)];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self> {
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            r_s: parameters.scalar("r_s")?,
        })
    }

    fn phi(&self, r: Scalar) -> Scalar {
        if r == 0.0 {
            return -self.gm / self.r_s;
        }
        -self.gm * libm::log1p(r / self.r_s) / r
    }

    fn dphi(&self, r: Scalar) -> Scalar {
        if r == 0.0 {
            return self.gm / (2.0 * self.r_s * self.r_s);
        }
        self.gm * (libm::log1p(r / self.r_s) / (r * r) - 1.0 / (r * (r + self.r_s)))
    }

    fn d2phi(&self, r: Scalar) -> Scalar {
        if r == 0.0 {
            return -2.0 * self.gm / (3.0 * self.r_s * self.r_s * self.r_s);
        }
        let rr = r + self.r_s;
        self.gm
            * (-2.0 * libm::log1p(r / self.r_s) / (r * r * r)
                + 2.0 / (r * r * rr)
                + 1.0 / (r * rr * rr))
    }
}

/// Flattened disk, `Φ = −GM / √(R² + (a + √(z² + b²))²)`
#[derive(Debug, Clone)]
pub struct MiyamotoNagai {
    gm: Scalar,
    a: Scalar,
    b: Scalar,
}

impl PotentialKernel for MiyamotoNagai {
    const NAME: &'static str = "miyamoto_nagai";
    const PARAMETERS: &'static [ParameterSpec] = &[
        MASS,
        ParameterSpec::scalar("a", Dimension::LENGTH),
        ParameterSpec::scalar("b", Dimension::LENGTH),
    ];

    fn from_parameters(parameters: &ParameterSet, _ndim: usize, g: Scalar) -> Result<Self> {
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            a: parameters.scalar("a")?,
            b: parameters.scalar("b")?,
        })
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        let (_, d) = self.distances(q);
        -self.gm / d
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let (bz, d) = self.distances(q);
        let f = self.gm / (d * d * d);
        out[0] = f * q[0];
        out[1] = f * q[1];
        out[2] = f * q[2] * (self.a + bz) / bz;
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let [x, y, z] = [q[0], q[1], q[2]];
        let (bz, d) = self.distances(q);
        let ab = self.a + bz;
        let d3 = d * d * d;
        let d5 = d3 * d * d;
        let gm = self.gm;

        let xz = -3.0 * gm * x * z * ab / (bz * d5);
        let yz = -3.0 * gm * y * z * ab / (bz * d5);
        let xy = -3.0 * gm * x * y / d5;

        out[0] = gm / d3 - 3.0 * gm * x * x / d5;
        out[1] = xy;
        out[2] = xz;
        out[3] = xy;
        out[4] = gm / d3 - 3.0 * gm * y * y / d5;
        out[5] = yz;
        out[6] = xz;
        out[7] = yz;
        out[8] = -3.0 * gm * z * z * ab * ab / (bz * bz * d5)
            + gm / d3 * (1.0 + self.a * self.b * self.b / (bz * bz * bz));
    }
}

impl MiyamotoNagai {
    /// `(√(z² + b²), D)`
    #[inline]
    fn distances(&self, q: &[Scalar]) -> (Scalar, Scalar) {
        let bz = libm::hypot(q[2], self.b);
        let ab = self.a + bz;
        (bz, libm::sqrt(q[0] * q[0] + q[1] * q[1] + ab * ab))
    }
}

/// Triaxial logarithmic halo, `Φ = ½ v_c² ln(r_h² + Σ x_k²/q_k²)`
#[derive(Debug, Clone)]
pub struct Logarithmic {
    v_c2: Scalar,
    r_h2: Scalar,
    inv_q2: [Scalar; 3],
}

impl Logarithmic {
    #[inline]
    fn s(&self, q: &[Scalar]) -> Scalar {
        self.r_h2
            + q.iter()
                .zip(&self.inv_q2)
                .map(|(x, iq)| x * x * iq)
                .sum::<Scalar>()
    }
}

impl PotentialKernel for Logarithmic {
    const NAME: &'static str = "logarithmic";
    const PARAMETERS: &'static [ParameterSpec] = &[
        ParameterSpec::scalar("v_c", Dimension::VELOCITY),
        ParameterSpec::scalar("r_h", Dimension::LENGTH),
        ParameterSpec::scalar("q1", Dimension::NONE),
        ParameterSpec::scalar("q2", Dimension::NONE),
        ParameterSpec::scalar("q3", Dimension::NONE),
    ];

    fn from_parameters(parameters: &ParameterSet, _ndim: usize, _g: Scalar) -> Result<Self> {
        let v_c = parameters.scalar("v_c")?;
        let r_h = parameters.scalar("r_h")?;
        let mut inv_q2 = [0.0; 3];
        for (slot, name) in inv_q2.iter_mut().zip(["q1", "q2", "q3"]) {
            let q = parameters.scalar(name)?;
            *slot = 1.0 / (q * q);
        }
        Ok(Self {
            v_c2: v_c * v_c,
            r_h2: r_h * r_h,
            inv_q2,
        })
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        0.5 * self.v_c2 * libm::log(self.s(q))
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let f = self.v_c2 / self.s(q);
        for ((o, x), iq) in out.iter_mut().zip(q).zip(&self.inv_q2) {
            *o = f * x * iq;
        }
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let s = self.s(q);
        for k in 0..3 {
            for l in 0..3 {
                let diagonal = if k == l { self.inv_q2[k] / s } else { 0.0 };
                out[k * 3 + l] = self.v_c2
                    * (diagonal - 2.0 * q[k] * q[l] * self.inv_q2[k] * self.inv_q2[l] / (s * s));
            }
        }
    }
}

/// Satoh disk, `Φ = −GM / √(R² + z² + a(a + 2√(z² + b²)))`
#[derive(Debug, Clone)]
pub struct Satoh {
    gm: Scalar,
    a: Scalar,
    b: Scalar,
}

impl Satoh {
    /// `(√(z² + b²), S)`
    #[inline]
    fn distances(&self, q: &[Scalar]) -> (Scalar, Scalar) {
        let bz = libm::hypot(q[2], self.b);
        let s2 = dot(q, q) + self.a * (self.a + 2.0 * bz);
        (bz, libm::sqrt(s2))
    }
}

impl PotentialKernel for Satoh {
    const NAME: &'static str = "satoh";
    const PARAMETERS: &'static [ParameterSpec] = &[
        MASS,
        ParameterSpec::scalar("a", Dimension::LENGTH),
        ParameterSpec::scalar("b", Dimension::LENGTH),
    ];

    fn from_parameters(parameters: &ParameterSet, _ndim: usize, g: Scalar) -> Result<Self> {
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            a: parameters.scalar("a")?,
            b: parameters.scalar("b")?,
        })
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        let (_, s) = self.distances(q);
        -self.gm / s
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let (bz, s) = self.distances(q);
        let f = self.gm / (s * s * s);
        out[0] = f * q[0];
        out[1] = f * q[1];
        out[2] = f * q[2] * (1.0 + self.a / bz);
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let (bz, s) = self.distances(q);
        let f = self.gm / (s * s * s);
        let s5 = s * s * s * s * s;
        // Stretch of the z axis in the gradient, and its z derivative folded in
        let c = [1.0, 1.0, 1.0 + self.a / bz];
        let c_zz = 1.0 + self.a * self.b * self.b / (bz * bz * bz);
        for k in 0..3 {
            for l in 0..3 {
                let diagonal = match (k == l, k) {
                    (false, _) => 0.0,
                    (true, 2) => f * c_zz,
                    (true, _) => f,
                };
                out[k * 3 + l] = diagonal - 3.0 * self.gm * q[k] * c[k] * q[l] * c[l] / s5;
            }
        }
    }
}

/// Stone & Ostriker halo with a core of radius `r_c` inside a halo radius `r_h`.
///
/// `Φ = −(2GM / π(r_h − r_c)) [(r_h/r) atan(r/r_h) − (r_c/r) atan(r/r_c)
/// + ½ ln((r² + r_h²)/(r² + r_c²))]`
#[derive(Debug, Clone)]
pub struct Stone {
    /// `2GM / π(r_h − r_c)`
    k: Scalar,
    r_c: Scalar,
    r_h: Scalar,
}

impl Stone {
    /// `r_h atan(r/r_h) − r_c atan(r/r_c)`, proportional to the enclosed mass
    #[inline]
    fn mass_term(&self, r: Scalar) -> Scalar {
        self.r_h * libm::atan(r / self.r_h) - self.r_c * libm::atan(r / self.r_c)
    }
}

impl RadialProfile for Stone {
    const NAME: &'static str = "stone";
    const PARAMETERS: &'static [ParameterSpec] = &[
        MASS,
        ParameterSpec::scalar("r_c", Dimension::LENGTH),
        ParameterSpec::scalar("r_h", Dimension::LENGTH),
    ];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self> {
        let r_c = parameters.scalar("r_c")?;
        let r_h = parameters.scalar("r_h")?;
        if !(r_c > 0.0 && r_h > r_c) {
            return Err(ConfigError::InvalidParameter {
                name: "r_h".to_string(),
                reason: format!("must exceed the core radius {r_c} > 0"),
            }
            .into());
        }
        Ok(Self {
            k: 2.0 * g * parameters.scalar("m")? / (PI * (r_h - r_c)),
            r_c,
            r_h,
        })
    }

    fn phi(&self, r: Scalar) -> Scalar {
        let (r_c, r_h) = (self.r_c, self.r_h);
        if r == 0.0 {
            return -self.k * libm::log(r_h / r_c);
        }
        -self.k
            * (r_h / r * libm::atan(r / r_h) - r_c / r * libm::atan(r / r_c)
                + 0.5 * libm::log((r * r + r_h * r_h) / (r * r + r_c * r_c)))
    }

    fn dphi(&self, r: Scalar) -> Scalar {
        if r == 0.0 {
            return 0.0;
        }
        self.k * self.mass_term(r) / (r * r)
    }

    fn d2phi(&self, r: Scalar) -> Scalar {
        let (r_c2, r_h2) = (self.r_c * self.r_c, self.r_h * self.r_h);
        if r == 0.0 {
            return self.k * (1.0 / r_c2 - 1.0 / r_h2) / 3.0;
        }
        let slope = r_h2 / (r_h2 + r * r) - r_c2 / (r_c2 + r * r);
        self.k * (slope / (r * r) - 2.0 * self.mass_term(r) / (r * r * r))
    }
}

/// Power law density with a Gaussian cutoff, `ρ ∝ r^(−α) exp(−(r/r_c)²)`,
/// normalized to total mass `m`.
///
/// With `a = (3 − α)/2` the enclosed mass is `M(r) = m P(a, (r/r_c)²)` and
/// `Φ = −GM [P(a, u)/r + Γ(a − ½, u) / (r_c Γ(a))]` at `u = (r/r_c)²`.
#[derive(Debug, Clone)]
pub struct PowerLawCutoff {
    gm: Scalar,
    alpha: Scalar,
    r_c: Scalar,
    shape: Scalar,
    gamma_shape: Scalar,
}

impl RadialProfile for PowerLawCutoff {
    const NAME: &'static str = "power_law_cutoff";
    const PARAMETERS: &'static [ParameterSpec] = &[
        MASS,
        ParameterSpec::scalar("alpha", Dimension::NONE),
        ParameterSpec::scalar("r_c", Dimension::LENGTH),
    ];

    fn from_parameters(parameters: &ParameterSet, g: Scalar) -> Result<Self> {
        let alpha = parameters.scalar("alpha")?;
        let r_c = parameters.scalar("r_c")?;
        if !(0.0..3.0).contains(&alpha) {
            return Err(ConfigError::InvalidParameter {
                name: "alpha".to_string(),
                reason: format!("{alpha} is outside [0, 3)"),
            }
            .into());
        }
        if r_c <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "r_c".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }
        let shape = 0.5 * (3.0 - alpha);
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            alpha,
            r_c,
            shape,
            gamma_shape: libm::tgamma(shape),
        })
    }

    fn phi(&self, r: Scalar) -> Scalar {
        let s = self.shape - 0.5;
        if r == 0.0 {
            return if s > 0.0 {
                -self.gm * libm::tgamma(s) / (self.r_c * self.gamma_shape)
            } else {
                Scalar::NEG_INFINITY
            };
        }
        let u = (r / self.r_c) * (r / self.r_c);
        -self.gm
            * (gamma_p(self.shape, u) / r + upper_gamma(s, u) / (self.r_c * self.gamma_shape))
    }

    fn dphi(&self, r: Scalar) -> Scalar {
        if r == 0.0 {
            return 0.0;
        }
        let u = (r / self.r_c) * (r / self.r_c);
        self.gm * gamma_p(self.shape, u) / (r * r)
    }

    /// `4πGρ − 2GM(r)/r³`
    fn d2phi(&self, r: Scalar) -> Scalar {
        let scale = 2.0 * self.gm / (libm::pow(self.r_c, 3.0 - self.alpha) * self.gamma_shape);
        if r == 0.0 {
            // Only the flat core is regular; P(3/2, u) ~ u^(3/2) / (3/2 Γ(3/2))
            return if self.alpha == 0.0 {
                scale / 3.0
            } else {
                Scalar::INFINITY
            };
        }
        let u = (r / self.r_c) * (r / self.r_c);
        scale * libm::pow(r, -self.alpha) * libm::exp(-u)
            - 2.0 * self.gm * gamma_p(self.shape, u) / (r * r * r)
    }
}

/// NFW halo flattened in the potential, `Φ = −GM ln(1 + ξ/r_s) / ξ` with
/// `ξ² = (x/a)² + (y/b)² + (z/c)²`.
///
/// The flattened Laplacian is not a physical density, so none is offered.
#[derive(Debug, Clone)]
pub struct TriaxialNfw {
    profile: Nfw,
    inv_q2: [Scalar; 3],
}

impl TriaxialNfw {
    #[inline]
    fn xi(&self, q: &[Scalar]) -> Scalar {
        libm::sqrt(
            q.iter()
                .zip(&self.inv_q2)
                .map(|(x, iq)| x * x * iq)
                .sum::<Scalar>(),
        )
    }
}

impl PotentialKernel for TriaxialNfw {
    const NAME: &'static str = "triaxial_nfw";
    const PARAMETERS: &'static [ParameterSpec] = &[
        MASS,
        ParameterSpec::scalar("r_s", Dimension::LENGTH),
        ParameterSpec::scalar("a", Dimension::NONE).with_default(1.0),
        ParameterSpec::scalar("b", Dimension::NONE).with_default(1.0),
        ParameterSpec::scalar("c", Dimension::NONE).with_default(1.0),
    ];
    const HAS_DENSITY: bool = false;

    fn from_parameters(parameters: &ParameterSet, _ndim: usize, g: Scalar) -> Result<Self> {
        let mut inv_q2 = [0.0; 3];
        for (slot, name) in inv_q2.iter_mut().zip(["a", "b", "c"]) {
            let q = parameters.scalar(name)?;
            *slot = 1.0 / (q * q);
        }
        Ok(Self {
            profile: Nfw::from_parameters(parameters, g)?,
            inv_q2,
        })
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        self.profile.phi(self.xi(q))
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let xi = self.xi(q);
        if xi == 0.0 {
            out.fill(0.0);
            return;
        }
        let scale = self.profile.dphi(xi) / xi;
        for ((o, x), iq) in out.iter_mut().zip(q).zip(&self.inv_q2) {
            *o = scale * x * iq;
        }
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let xi = self.xi(q);
        if xi == 0.0 {
            let d2 = self.profile.d2phi(0.0);
            for k in 0..3 {
                for l in 0..3 {
                    out[k * 3 + l] = if k == l { d2 * self.inv_q2[k] } else { 0.0 };
                }
            }
            return;
        }

        let d1 = self.profile.dphi(xi);
        let d2 = self.profile.d2phi(xi);
        for k in 0..3 {
            for l in 0..3 {
                let uu = q[k] * q[l] * self.inv_q2[k] * self.inv_q2[l] / (xi * xi);
                let diagonal = if k == l { self.inv_q2[k] } else { 0.0 };
                out[k * 3 + l] = d2 * uu + d1 / xi * (diagonal - uu);
            }
        }
    }
}

/// `F₁, F₂, F₃` of the Lee & Suto expansion and their first two derivatives
/// in `u = r/r_s`
struct LeeSutoTerms {
    f: [Scalar; 3],
    d1: [Scalar; 3],
    d2: [Scalar; 3],
}

impl LeeSutoTerms {
    fn at(u: Scalar) -> Self {
        let l = libm::log1p(u);
        let (u2, u3) = (u * u, u * u * u);
        let (u4, u5) = (u3 * u, u3 * u2);
        let up1 = 1.0 + u;

        let f1 = -l / u;
        let f1_d1 = l / u2 - 1.0 / (u * up1);
        let f1_d2 = -2.0 * l / u3 + 2.0 / (u2 * up1) + 1.0 / (u * up1 * up1);

        let f2 = -0.5 / u + 1.0 / u2 + (1.0 / u - 1.0 / u3) * l;
        let f2_d1 = 1.5 / u2 - 3.0 / u3 + (3.0 / u4 - 1.0 / u2) * l;
        let f2_d2 = -3.0 / u3 + 9.0 / u4
            + (2.0 / u3 - 12.0 / u5) * l
            + (3.0 / u4 - 1.0 / u2) / up1;

        // F₃ = R(u) + 3 ln(1+u)/u³ with R = (u² − 3u − 6) / (2u²(1 + u))
        let numerator = -u3 + 6.0 * u2 + 21.0 * u + 12.0;
        let denominator = u3 * up1 * up1;
        let r_d1 = numerator / (2.0 * denominator);
        let r_d2 = ((-3.0 * u2 + 12.0 * u + 21.0) * denominator
            - numerator * (5.0 * u4 + 8.0 * u3 + 3.0 * u2))
            / (2.0 * denominator * denominator);
        let f3 = (u2 - 3.0 * u - 6.0) / (2.0 * u2 * up1) + 3.0 * l / u3;
        let f3_d1 = r_d1 - 9.0 * l / u4 + 3.0 / (u3 * up1);
        let f3_d2 = r_d2 + 36.0 * l / u5 - 18.0 / (u4 * up1) - 3.0 / (u3 * up1 * up1);

        Self {
            f: [f1, f2, f3],
            d1: [f1_d1, f2_d1, f3_d1],
            d2: [f1_d2, f2_d2, f3_d2],
        }
    }
}

/// Lee & Suto (2003) triaxial NFW halo, parameterized by the circular
/// speed `v_c` at the scale radius and the density axis ratios `a ≥ b ≥ c`.
///
/// `Φ = φ₀ [F₁(u) + ½(e_b² + e_c²) F₂(u) + (e_b² y² + e_c² z²)/(2r²) F₃(u)]`
/// with `e_b² = 1 − (b/a)²` and `e_c² = 1 − (c/a)²`.
#[derive(Debug, Clone)]
pub struct LeeSutoTriaxialNfw {
    phi0: Scalar,
    r_s: Scalar,
    /// `e²` per axis; the x axis is the reference
    e2: [Scalar; 3],
}

impl LeeSutoTriaxialNfw {
    /// `½(e_b² + e_c²)`
    #[inline]
    fn mean_e2(&self) -> Scalar {
        0.5 * (self.e2[1] + self.e2[2])
    }
}

impl PotentialKernel for LeeSutoTriaxialNfw {
    const NAME: &'static str = "lee_suto_triaxial_nfw";
    const PARAMETERS: &'static [ParameterSpec] = &[
        ParameterSpec::scalar("v_c", Dimension::VELOCITY),
        ParameterSpec::scalar("r_s", Dimension::LENGTH),
        ParameterSpec::scalar("a", Dimension::NONE).with_default(1.0),
        ParameterSpec::scalar("b", Dimension::NONE).with_default(1.0),
        ParameterSpec::scalar("c", Dimension::NONE).with_default(1.0),
    ];

    fn from_parameters(parameters: &ParameterSet, _ndim: usize, _g: Scalar) -> Result<Self> {
        let v_c = parameters.scalar("v_c")?;
        let a = parameters.scalar("a")?;
        let e_b2 = 1.0 - libm::pow(parameters.scalar("b")? / a, 2.0);
        let e_c2 = 1.0 - libm::pow(parameters.scalar("c")? / a, 2.0);
        let ln2 = std::f64::consts::LN_2;
        Ok(Self {
            phi0: v_c * v_c / (ln2 - 0.5 + (ln2 - 0.75) * (e_b2 + e_c2)),
            r_s: parameters.scalar("r_s")?,
            e2: [0.0, e_b2, e_c2],
        })
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        let r2 = dot(q, q);
        if r2 == 0.0 {
            // F₁ → −1, F₂ → 2/3, F₃ → 0
            return self.phi0 * (-1.0 + 2.0 / 3.0 * self.mean_e2());
        }
        let r = libm::sqrt(r2);
        let terms = LeeSutoTerms::at(r / self.r_s);
        let w = 0.5 * (self.e2[1] * q[1] * q[1] + self.e2[2] * q[2] * q[2]) / r2;
        self.phi0 * (terms.f[0] + self.mean_e2() * terms.f[1] + w * terms.f[2])
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let r2 = dot(q, q);
        if r2 == 0.0 {
            out.fill(0.0);
            return;
        }
        let r = libm::sqrt(r2);
        let terms = LeeSutoTerms::at(r / self.r_s);
        let w = 0.5 * (self.e2[1] * q[1] * q[1] + self.e2[2] * q[2] * q[2]) / r2;
        let radial =
            (terms.d1[0] + self.mean_e2() * terms.d1[1] + w * terms.d1[2]) / (r * self.r_s);
        for k in 0..3 {
            let angular = terms.f[2] * (self.e2[k] - 2.0 * w) / r2;
            out[k] = self.phi0 * q[k] * (radial + angular);
        }
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let r2 = dot(q, q);
        let r = libm::sqrt(r2);
        let r_s = self.r_s;
        let terms = LeeSutoTerms::at(r / r_s);
        let e = self.mean_e2();
        let w = 0.5 * (self.e2[1] * q[1] * q[1] + self.e2[2] * q[2] * q[2]) / r2;

        let slope = terms.d1[0] + e * terms.d1[1] + w * terms.d1[2];
        let curvature = terms.d2[0] + e * terms.d2[1] + w * terms.d2[2];
        let radial = slope / (r * r_s);
        // ∂w/∂x_k = x_k · tilt[k]
        let tilt: [Scalar; 3] = std::array::from_fn(|k| (self.e2[k] - 2.0 * w) / r2);

        for k in 0..3 {
            for l in 0..3 {
                let diagonal = if k == l {
                    radial + terms.f[2] * tilt[k]
                } else {
                    0.0
                };
                let cross = curvature / (r2 * r_s * r_s) - slope / (r2 * r * r_s)
                    + terms.d1[2] * (tilt[k] + tilt[l]) / (r * r_s)
                    - 2.0 * terms.f[2] * (tilt[k] + tilt[l]) / r2;
                out[k * 3 + l] = self.phi0 * (diagonal + q[k] * q[l] * cross);
            }
        }
    }
}

/// Second-order terms of `f = ln(p + T)`, `T = √(p² + y² + B²)`, in
/// `(p, y, B)`
#[derive(Debug, Clone, Copy)]
struct BarTerm {
    value: Scalar,
    x: Scalar,
    y: Scalar,
    b: Scalar,
    xx: Scalar,
    xy: Scalar,
    xb: Scalar,
    yy: Scalar,
    yb: Scalar,
    bb: Scalar,
}

impl BarTerm {
    fn at(p: Scalar, y: Scalar, big_b: Scalar) -> Self {
        let t = libm::sqrt(p * p + y * y + big_b * big_b);
        let v = t * (p + t);
        let t3 = t * t * t;
        let bend = (p + 2.0 * t) / (t * v * v);
        Self {
            value: libm::log(p + t),
            x: 1.0 / t,
            y: y / v,
            b: big_b / v,
            xx: -p / t3,
            xy: -y / t3,
            xb: -big_b / t3,
            yy: 1.0 / v - y * y * bend,
            yb: -y * big_b * bend,
            bb: 1.0 / v - big_b * big_b * bend,
        }
    }

    fn minus(self, other: Self) -> Self {
        Self {
            value: self.value - other.value,
            x: self.x - other.x,
            y: self.y - other.y,
            b: self.b - other.b,
            xx: self.xx - other.xx,
            xy: self.xy - other.xy,
            xb: self.xb - other.xb,
            yy: self.yy - other.yy,
            yb: self.yb - other.yb,
            bb: self.bb - other.bb,
        }
    }
}

/// Long & Murali (1992) bar of half-length `a` along x, thickened by `b`
/// and `c`, turned by `alpha` about z.
///
/// `Φ = (GM/2a) ln[(x − a + T₋)/(x + a + T₊)]` with
/// `T± = √((a ± x)² + y² + (b + √(c² + z²))²)`
#[derive(Debug, Clone)]
pub struct LongMuraliBar {
    gm: Scalar,
    a: Scalar,
    b: Scalar,
    c: Scalar,
    cos_alpha: Scalar,
    sin_alpha: Scalar,
}

impl LongMuraliBar {
    /// Bar frame coordinates
    #[inline]
    fn local(&self, q: &[Scalar]) -> [Scalar; 3] {
        let (c, s) = (self.cos_alpha, self.sin_alpha);
        [q[0] * c + q[1] * s, -q[0] * s + q[1] * c, q[2]]
    }

    /// `f(x − a) − f(x + a)`, plus `B`, `∂B/∂z` and `∂²B/∂z²`
    fn terms(&self, x: [Scalar; 3]) -> (BarTerm, Scalar, Scalar, Scalar) {
        let sz = libm::hypot(self.c, x[2]);
        let big_b = self.b + sz;
        let f = BarTerm::at(x[0] - self.a, x[1], big_b)
            .minus(BarTerm::at(x[0] + self.a, x[1], big_b));
        (f, big_b, x[2] / sz, self.c * self.c / (sz * sz * sz))
    }
}

impl PotentialKernel for LongMuraliBar {
    const NAME: &'static str = "long_murali_bar";
    const PARAMETERS: &'static [ParameterSpec] = &[
        MASS,
        ParameterSpec::scalar("a", Dimension::LENGTH),
        ParameterSpec::scalar("b", Dimension::LENGTH),
        ParameterSpec::scalar("c", Dimension::LENGTH),
        ParameterSpec::scalar("alpha", Dimension::ANGLE).with_default(0.0),
    ];

    fn from_parameters(parameters: &ParameterSet, _ndim: usize, g: Scalar) -> Result<Self> {
        let (sin_alpha, cos_alpha) = libm::sincos(parameters.scalar("alpha")?);
        Ok(Self {
            gm: g * parameters.scalar("m")?,
            a: parameters.scalar("a")?,
            b: parameters.scalar("b")?,
            c: parameters.scalar("c")?,
            cos_alpha,
            sin_alpha,
        })
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        let (f, ..) = self.terms(self.local(q));
        self.gm / (2.0 * self.a) * f.value
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let (f, _, b_z, _) = self.terms(self.local(q));
        let k = self.gm / (2.0 * self.a);
        let (c, s) = (self.cos_alpha, self.sin_alpha);
        let (gx, gy) = (k * f.x, k * f.y);
        out[0] = c * gx - s * gy;
        out[1] = s * gx + c * gy;
        out[2] = k * f.b * b_z;
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let (f, _, b_z, b_zz) = self.terms(self.local(q));
        let k = self.gm / (2.0 * self.a);
        let local = [
            [f.xx, f.xy, f.xb * b_z],
            [f.xy, f.yy, f.yb * b_z],
            [f.xb * b_z, f.yb * b_z, f.bb * b_z * b_z + f.b * b_zz],
        ];

        // H = Rᵀ H' R for x' = R q
        let (c, s) = (self.cos_alpha, self.sin_alpha);
        let rotation = [[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]];
        for m in 0..3 {
            for n in 0..3 {
                let mut sum = 0.0;
                for i in 0..3 {
                    for j in 0..3 {
                        sum += rotation[i][m] * local[i][j] * rotation[j][n];
                    }
                }
                out[m * 3 + n] = k * sum;
            }
        }
    }
}

impl Analytic<Spherical<Nfw>> {
    /// NFW halo whose circular speed at `r_ref` (default `r_s`) is `v_c`
    pub fn from_circular_velocity(
        v_c: impl Into<ParameterInput>,
        r_s: impl Into<ParameterInput>,
        r_ref: Option<ParameterInput>,
        units: UnitSystem,
    ) -> Result<Self> {
        const SPECS: &[ParameterSpec] = &[
            ParameterSpec::scalar("v_c", Dimension::VELOCITY),
            ParameterSpec::scalar("r_s", Dimension::LENGTH),
            ParameterSpec::scalar("r_ref", Dimension::LENGTH),
        ];

        let mut inputs = BTreeMap::new();
        inputs.insert("v_c".to_string(), v_c.into());
        let r_s = r_s.into();
        inputs.insert("r_ref".to_string(), r_ref.unwrap_or_else(|| r_s.clone()));
        inputs.insert("r_s".to_string(), r_s);
        let resolved = ParameterSet::resolve(Nfw::NAME, SPECS, inputs, 3, &units)?;

        let v_c = resolved.scalar("v_c")?;
        let r_s = resolved.scalar("r_s")?;
        let r_ref = resolved.scalar("r_ref")?;
        let x = r_ref / r_s;
        let enclosed = libm::log1p(x) - x / (1.0 + x);
        let m = v_c * v_c * r_ref / (units.gravitational_constant() * enclosed);

        Self::builder()
            .parameter("m", m)
            .parameter("r_s", r_s)
            .units(units)
            .build()
    }
}

/// `Φ = ½(x² + y²) + x²y − y³/3`
#[derive(Debug, Clone)]
pub struct HenonHeiles;

impl PotentialKernel for HenonHeiles {
    const NAME: &'static str = "henon_heiles";
    const PARAMETERS: &'static [ParameterSpec] = &[];
    const DIMENSIONALITY: Dimensionality = Dimensionality::Fixed(2);
    const HAS_DENSITY: bool = false;

    fn from_parameters(_parameters: &ParameterSet, _ndim: usize, _g: Scalar) -> Result<Self> {
        Ok(Self)
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        let [x, y] = [q[0], q[1]];
        0.5 * (x * x + y * y) + x * x * y - y * y * y / 3.0
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let [x, y] = [q[0], q[1]];
        out[0] = x + 2.0 * x * y;
        out[1] = y + x * x - y * y;
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let [x, y] = [q[0], q[1]];
        out[0] = 1.0 + 2.0 * y;
        out[1] = 2.0 * x;
        out[2] = 2.0 * x;
        out[3] = 1.0 - 2.0 * y;
    }
}

/// `Φ = ½ Σ ω_k² q_k²`, in as many dimensions as `omega` has entries
#[derive(Debug, Clone)]
pub struct HarmonicOscillator {
    omega2: Vec<Scalar>,
}

impl PotentialKernel for HarmonicOscillator {
    const NAME: &'static str = "harmonic_oscillator";
    const PARAMETERS: &'static [ParameterSpec] =
        &[ParameterSpec::per_axis("omega", Dimension::FREQUENCY)];
    const DIMENSIONALITY: Dimensionality = Dimensionality::FromParameter("omega");
    const HAS_DENSITY: bool = false;

    fn from_parameters(parameters: &ParameterSet, _ndim: usize, _g: Scalar) -> Result<Self> {
        let omega2 = parameters.vector("omega")?.iter().map(|w| w * w).collect();
        Ok(Self { omega2 })
    }

    fn energy(&self, q: &[Scalar], _t: Scalar) -> Scalar {
        0.5 * q.iter().zip(&self.omega2).map(|(x, w2)| w2 * x * x).sum::<Scalar>()
    }

    fn gradient(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        for ((o, x), w2) in out.iter_mut().zip(q).zip(&self.omega2) {
            *o = w2 * x;
        }
    }

    fn hessian(&self, q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        let n = q.len();
        out.fill(0.0);
        for (k, w2) in self.omega2.iter().enumerate() {
            out[k * n + k] = *w2;
        }
    }
}

/// `Φ = 0`
#[derive(Debug, Clone)]
pub struct Null;

impl PotentialKernel for Null {
    const NAME: &'static str = "null";
    const PARAMETERS: &'static [ParameterSpec] = &[];
    const DIMENSIONALITY: Dimensionality = Dimensionality::Any;

    fn from_parameters(_parameters: &ParameterSet, _ndim: usize, _g: Scalar) -> Result<Self> {
        Ok(Self)
    }

    fn energy(&self, _q: &[Scalar], _t: Scalar) -> Scalar {
        0.0
    }

    fn gradient(&self, _q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        out.fill(0.0);
    }

    fn hessian(&self, _q: &[Scalar], _t: Scalar, out: &mut [Scalar]) {
        out.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::potential::{Potential, PotentialExt, Times};
    use crate::units::{KM, S};
    use approx::assert_relative_eq;
    use ndarray::arr1;

    #[test]
    fn test_kepler_is_point_mass() {
        let kepler = KeplerPotential::builder()
            .parameter("m", 2.0)
            .build()
            .unwrap();
        assert_relative_eq!(kepler.value_at(&[2.0, 0.0, 0.0], 0.0).unwrap(), -1.0);
        let density = kepler
            .density(arr1(&[1.0, 1.0, 0.0]).into_dyn().view(), Times::Scalar(0.0))
            .unwrap();
        assert_eq!(density[[]], 0.0);
    }

    #[test]
    fn test_spherical_center_is_regular() {
        let plummer = PlummerPotential::builder()
            .parameter("m", 1.0)
            .parameter("b", 1.0)
            .build()
            .unwrap();
        let g = plummer.gradient_at(&[0.0, 0.0, 0.0], 0.0).unwrap();
        assert_eq!(g, vec![0.0, 0.0, 0.0]);

        let h = plummer
            .hessian(arr1(&[0.0, 0.0, 0.0]).into_dyn().view(), Times::Scalar(0.0))
            .unwrap();
        assert_relative_eq!(h[[0, 0]], 1.0);
        assert_relative_eq!(h[[0, 1]], 0.0);
    }

    #[test]
    fn test_plummer_density_matches_analytic_profile() {
        let plummer = PlummerPotential::builder()
            .parameter("m", 1.0)
            .parameter("b", 1.0)
            .build()
            .unwrap();
        let r: Scalar = 0.7;
        let rho = plummer
            .density(arr1(&[r, 0.0, 0.0]).into_dyn().view(), Times::Scalar(0.0))
            .unwrap();
        let expected = 3.0 / (4.0 * std::f64::consts::PI) * libm::pow(1.0 + r * r, -2.5);
        assert_relative_eq!(rho[[]], expected, max_relative = 1e-12);
    }

    #[test]
    fn test_nfw_center_is_finite() {
        let nfw = NFWPotential::builder()
            .parameter("m", 1.0)
            .parameter("r_s", 2.0)
            .build()
            .unwrap();
        let center = nfw.value_at(&[0.0, 0.0, 0.0], 0.0).unwrap();
        let near = nfw.value_at(&[1e-6, 0.0, 0.0], 0.0).unwrap();
        assert_relative_eq!(center, -0.5);
        assert_relative_eq!(center, near, max_relative = 1e-6);
    }

    #[test]
    fn test_henon_heiles_is_two_dimensional() {
        let hh = HenonHeilesPotential::builder().build().unwrap();
        assert_eq!(hh.ndim(), 2);
        assert_relative_eq!(hh.value_at(&[1.0, 1.0], 0.0).unwrap(), 1.0 + 1.0 - 1.0 / 3.0);
        assert!(
            hh.density(arr1(&[0.1, 0.1]).into_dyn().view(), Times::Scalar(0.0))
                .is_err()
        );
    }

    #[test]
    fn test_harmonic_oscillator_takes_ndim_from_omega() {
        let ho = HarmonicOscillatorPotential::builder()
            .parameter("omega", vec![1.0, 2.0])
            .build()
            .unwrap();
        assert_eq!(ho.ndim(), 2);
        assert_eq!(ho.gradient_at(&[1.0, 1.0], 0.0).unwrap(), vec![1.0, 4.0]);
    }

    #[test]
    fn test_null_accepts_requested_ndim() {
        let null = NullPotential::builder().ndim(1).build().unwrap();
        assert_eq!(null.ndim(), 1);
        assert_eq!(null.value_at(&[4.0], 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_logarithmic_flat_rotation_curve() {
        let log = LogarithmicPotential::builder()
            .parameter("v_c", 0.2)
            .parameter("r_h", 0.0)
            .parameter("q1", 1.0)
            .parameter("q2", 1.0)
            .parameter("q3", 1.0)
            .units(UnitSystem::galactic())
            .build()
            .unwrap();
        for r in [1.0, 10.0, 50.0] {
            let v = log
                .circular_velocity(arr1(&[r, 0.0, 0.0]).into_dyn().view(), Times::Scalar(0.0))
                .unwrap();
            assert_relative_eq!(v[[]], 0.2, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_power_law_cutoff_density_matches_profile() {
        let plc = PowerLawCutoffPotential::builder()
            .parameter("m", 1.0)
            .parameter("alpha", 1.8)
            .parameter("r_c", 1.0)
            .build()
            .unwrap();
        let shape = 0.5 * (3.0 - 1.8);
        for r in [0.3, 0.8, 1.7] {
            let rho = plc
                .density(arr1(&[0.0, r, 0.0]).into_dyn().view(), Times::Scalar(0.0))
                .unwrap();
            let expected = libm::pow(r, -1.8) * libm::exp(-r * r)
                / (2.0 * std::f64::consts::PI * libm::tgamma(shape));
            assert_relative_eq!(rho[[]], expected, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_power_law_cutoff_rejects_steep_slopes() {
        let err = PowerLawCutoffPotential::builder()
            .parameter("m", 1.0)
            .parameter("alpha", 3.0)
            .parameter("r_c", 1.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_stone_encloses_total_mass_far_out() {
        let stone = StonePotential::builder()
            .parameter("m", 1.0)
            .parameter("r_c", 0.2)
            .parameter("r_h", 2.0)
            .build()
            .unwrap();
        let r = 1.0e3;
        let phi = stone.value_at(&[r, 0.0, 0.0], 0.0).unwrap();
        assert_relative_eq!(phi, -1.0 / r, max_relative = 1e-2);
        let g = stone.gradient_at(&[0.0, 0.0, r], 0.0).unwrap();
        assert_relative_eq!(g[2] * r * r, 1.0, max_relative = 1e-2);

        assert!(
            StonePotential::builder()
                .parameter("m", 1.0)
                .parameter("r_c", 2.0)
                .parameter("r_h", 0.2)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_nfw_from_circular_velocity() {
        let units = UnitSystem::galactic();
        let v_c = 220.0 * (KM / S);
        let nfw =
            NFWPotential::from_circular_velocity(v_c.clone(), 15.0, None, units.clone()).unwrap();
        let expected = units.decompose(&v_c).unwrap();
        let v = nfw
            .circular_velocity(arr1(&[15.0, 0.0, 0.0]).into_dyn().view(), Times::Scalar(0.0))
            .unwrap();
        assert_relative_eq!(v[[]], expected, max_relative = 1e-10);

        let nfw = NFWPotential::from_circular_velocity(v_c, 15.0, Some(ParameterInput::from(8.0)), units).unwrap();
        let v = nfw
            .circular_velocity(arr1(&[0.0, 8.0, 0.0]).into_dyn().view(), Times::Scalar(0.0))
            .unwrap();
        assert_relative_eq!(v[[]], expected, max_relative = 1e-10);
    }

    #[test]
    fn test_triaxial_nfw_with_unit_axes_is_spherical() {
        let triaxial = TriaxialNFWPotential::builder()
            .parameter("m", 1.0)
            .parameter("r_s", 1.5)
            .build()
            .unwrap();
        let spherical = NFWPotential::builder()
            .parameter("m", 1.0)
            .parameter("r_s", 1.5)
            .build()
            .unwrap();
        let q = [0.4, -1.1, 0.7];
        assert_relative_eq!(
            triaxial.value_at(&q, 0.0).unwrap(),
            spherical.value_at(&q, 0.0).unwrap(),
            max_relative = 1e-14
        );
        let a = triaxial.gradient_at(&q, 0.0).unwrap();
        let b = spherical.gradient_at(&q, 0.0).unwrap();
        for k in 0..3 {
            assert_relative_eq!(a[k], b[k], max_relative = 1e-12);
        }

        let view = arr1(&q).into_dyn();
        let ha = triaxial.hessian(view.view(), Times::Scalar(0.0)).unwrap();
        let hb = spherical.hessian(view.view(), Times::Scalar(0.0)).unwrap();
        for (x, y) in ha.iter().zip(hb.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_lee_suto_with_equal_axes_is_nfw() {
        let lee_suto = LeeSutoTriaxialNFWPotential::builder()
            .parameter("v_c", 1.0)
            .parameter("r_s", 0.5)
            .build()
            .unwrap();
        let phi0 = 1.0 / (std::f64::consts::LN_2 - 0.5);
        let nfw = NFWPotential::builder()
            .parameter("m", phi0 * 0.5)
            .parameter("r_s", 0.5)
            .build()
            .unwrap();

        let q = [0.9, 0.3, -0.6];
        assert_relative_eq!(
            lee_suto.value_at(&q, 0.0).unwrap(),
            nfw.value_at(&q, 0.0).unwrap(),
            max_relative = 1e-12
        );
        let a = lee_suto.gradient_at(&q, 0.0).unwrap();
        let b = nfw.gradient_at(&q, 0.0).unwrap();
        for k in 0..3 {
            assert_relative_eq!(a[k], b[k], max_relative = 1e-10);
        }
        let view = arr1(&q).into_dyn();
        let rho_a = lee_suto.density(view.view(), Times::Scalar(0.0)).unwrap();
        let rho_b = nfw.density(view.view(), Times::Scalar(0.0)).unwrap();
        assert_relative_eq!(rho_a[[]], rho_b[[]], max_relative = 1e-8);

        let center = lee_suto.value_at(&[0.0, 0.0, 0.0], 0.0).unwrap();
        assert_relative_eq!(center, -phi0, max_relative = 1e-14);
    }

    #[test]
    fn test_long_murali_bar_angle_turns_the_bar() {
        let bar = |alpha: Scalar| {
            LongMuraliBarPotential::builder()
                .parameter("m", 1.0)
                .parameter("a", 1.0)
                .parameter("b", 0.5)
                .parameter("c", 0.3)
                .parameter("alpha", alpha)
                .build()
                .unwrap()
        };
        let aligned = bar(0.0);
        let turned = bar(std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(
            aligned.value_at(&[0.8, 0.2, 0.1], 0.0).unwrap(),
            turned.value_at(&[-0.2, 0.8, 0.1], 0.0).unwrap(),
            max_relative = 1e-12
        );
        // Deeper along the bar than across it
        let along = aligned.value_at(&[1.0, 0.0, 0.0], 0.0).unwrap();
        let across = aligned.value_at(&[0.0, 1.0, 0.0], 0.0).unwrap();
        assert!(along < across);
    }
}
