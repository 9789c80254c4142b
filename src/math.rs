//! Scalar type and small fixed-size vector helpers shared by the kernels

/// Scalar type for all numeric work (f64 for precision)
pub type Scalar = f64;

/// Largest spatial dimensionality an analytic potential accepts.
///
/// Per-point kernels work on stack buffers of this length.
pub const MAX_NDIM: usize = 3;

#[inline]
pub fn dot(a: &[Scalar], b: &[Scalar]) -> Scalar {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `out = Rᵀ v` for a row-major `n×n` matrix
#[inline]
pub fn rotate_transpose(r: &[Scalar], v: &[Scalar], out: &mut [Scalar]) {
    let n = v.len();
    for (j, o) in out.iter_mut().enumerate().take(n) {
        *o = (0..n).map(|i| r[i * n + j] * v[i]).sum();
    }
}

/// `out = R v` for a row-major `n×n` matrix
#[inline]
pub fn rotate(r: &[Scalar], v: &[Scalar], out: &mut [Scalar]) {
    let n = v.len();
    for (i, o) in out.iter_mut().enumerate().take(n) {
        *o = dot(&r[i * n..(i + 1) * n], v);
    }
}

/// Distance to the next representable value from `t` in `direction`
#[inline]
pub fn spacing(t: Scalar, direction: Scalar) -> Scalar {
    let target = if direction >= 0.0 {
        Scalar::INFINITY
    } else {
        Scalar::NEG_INFINITY
    };
    (libm::nextafter(t, target) - t).abs()
}

/// RMS norm over a slice, `sqrt(mean(x²))`
#[inline]
pub fn rms(values: impl Iterator<Item = Scalar>) -> Scalar {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v * v, n + 1));
    if count == 0 {
        0.0
    } else {
        libm::sqrt(sum / count as Scalar)
    }
}

const SPECIAL_EPSILON: Scalar = 1e-16;
const SPECIAL_MAX_ITERATIONS: usize = 1000;
const TINY: Scalar = 1e-300;
const EULER_GAMMA: Scalar = 0.577_215_664_901_532_9;

/// Unregularized lower incomplete gamma `γ(a, x)` by its power series,
/// for `a > 0` and `x < a + 1`
fn lower_gamma_series(a: Scalar, x: Scalar) -> Scalar {
    let mut term = 1.0 / a;
    let mut sum = term;
    let mut n = a;
    for _ in 0..SPECIAL_MAX_ITERATIONS {
        n += 1.0;
        term *= x / n;
        sum += term;
        if term.abs() < sum.abs() * SPECIAL_EPSILON {
            break;
        }
    }
    sum * libm::exp(-x + a * libm::log(x))
}

/// Unregularized upper incomplete gamma `Γ(a, x)` by Lentz's continued
/// fraction; converges quickly once `x > a + 1`
fn upper_gamma_fraction(a: Scalar, x: Scalar) -> Scalar {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..SPECIAL_MAX_ITERATIONS {
        let i = i as Scalar;
        let an = -i * (i - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < SPECIAL_EPSILON {
            break;
        }
    }
    libm::exp(-x + a * libm::log(x)) * h
}

/// Regularized lower incomplete gamma `P(a, x)` for `a > 0`
pub fn gamma_p(a: Scalar, x: Scalar) -> Scalar {
    if x <= 0.0 {
        0.0
    } else if x < a + 1.0 {
        lower_gamma_series(a, x) / libm::tgamma(a)
    } else {
        1.0 - upper_gamma_fraction(a, x) / libm::tgamma(a)
    }
}

/// Unregularized upper incomplete gamma `Γ(s, x)` for `s > -1` and `x > 0`.
///
/// Non-positive `s` goes through `Γ(s, x) = (Γ(s + 1, x) − xˢe⁻ˣ) / s`,
/// with the exponential integral `E₁(x)` at `s = 0`.
pub fn upper_gamma(s: Scalar, x: Scalar) -> Scalar {
    if s > 0.0 {
        if x < s + 1.0 {
            libm::tgamma(s) - lower_gamma_series(s, x)
        } else {
            upper_gamma_fraction(s, x)
        }
    } else if s == 0.0 {
        exponential_integral(x)
    } else {
        (upper_gamma(s + 1.0, x) - libm::exp(s * libm::log(x) - x)) / s
    }
}

/// `E₁(x)` for `x > 0`
fn exponential_integral(x: Scalar) -> Scalar {
    if x > 1.0 {
        return upper_gamma_fraction(0.0, x);
    }
    let mut term = 1.0;
    let mut sum = 0.0;
    for k in 1..SPECIAL_MAX_ITERATIONS {
        let k = k as Scalar;
        term *= -x / k;
        sum += term / k;
        if (term / k).abs() < sum.abs() * SPECIAL_EPSILON {
            break;
        }
    }
    -EULER_GAMMA - libm::log(x) - sum
}
