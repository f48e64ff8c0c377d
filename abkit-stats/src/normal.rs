//! Standard Normal Primitives
//!
//! Closed-form approximations used by every engine. The CDF is exactly
//! antisymmetric around 0.5 by construction: the approximation is only ever
//! evaluated for `z >= 0`, and negative arguments are mirrored.

use crate::variant::ConfidenceLevel;
use std::f64::consts::{PI, SQRT_2};

/// Beyond this |z| the CDF is clamped to 0 or 1
pub const Z_CLAMP: f64 = 6.0;

/// Standard normal CDF Φ(z)
///
/// tanh/arctan closed form (Vazquez-Leal et al.), absolute error below 1e-4 on
/// [-6, 6]. Satisfies `normal_cdf(-z) == 1.0 - normal_cdf(z)` bit-for-bit: the
/// upper half lies in [0.5, 1], where `1 - p` is exact.
pub fn normal_cdf(z: f64) -> f64 {
    if z.is_nan() {
        return 0.5;
    }
    if z > Z_CLAMP {
        return 1.0;
    }
    if z < -Z_CLAMP {
        return 0.0;
    }
    if z < 0.0 {
        1.0 - upper_half_cdf(-z)
    } else {
        upper_half_cdf(z)
    }
}

/// Φ(z) for z in [0, Z_CLAMP], always in [0.5, 1]
fn upper_half_cdf(z: f64) -> f64 {
    let s = (2.0 * PI).sqrt();
    let arg = 39.0 * z / (2.0 * s) - 55.5 * (35.0 * z / (111.0 * s)).atan();
    (0.5 * arg.tanh() + 0.5).clamp(0.5, 1.0)
}

/// Standard normal density φ(z)
pub fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

/// Upper tail probability `1 - Φ(z)`
pub fn normal_sf(z: f64) -> f64 {
    1.0 - normal_cdf(z)
}

/// Standard normal quantile (inverse CDF)
///
/// Abramowitz and Stegun 26.2.23 rational approximation, |error| < 4.5e-4.
/// Returns ±infinity at p = 0 / 1; callers needing finite output clamp first.
pub fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if p == 0.5 {
        return 0.0;
    }

    let p = p.clamp(1e-10, 1.0 - 1e-10);

    let sign = if p < 0.5 { -1.0 } else { 1.0 };
    let tail = if p < 0.5 { p } else { 1.0 - p };

    let t = (-2.0 * tail.ln()).sqrt();

    let c0 = 2.515517;
    let c1 = 0.802853;
    let c2 = 0.010328;
    let d1 = 1.432788;
    let d2 = 0.189269;
    let d3 = 0.001308;

    let x = t - (c0 + c1 * t + c2 * t * t) / (1.0 + d1 * t + d2 * t * t + d3 * t * t * t);

    sign * x
}

/// Inverse error function, via `erf⁻¹(x) = Φ⁻¹((x + 1) / 2) / √2`
pub fn inverse_erf(x: f64) -> f64 {
    if x <= -1.0 {
        return f64::NEG_INFINITY;
    }
    if x >= 1.0 {
        return f64::INFINITY;
    }
    normal_quantile((x + 1.0) / 2.0) / SQRT_2
}

/// Critical Z for the given confidence level
///
/// Upper-tail area is α (one-sided) or α/2 (two-sided). Two-sided table values:
/// 90% → 1.645, 95% → 1.96, 99% → 2.576.
pub fn critical_z(level: ConfidenceLevel, two_sided: bool) -> f64 {
    critical_z_for_alpha(level.alpha(), two_sided)
}

/// Critical Z for an arbitrary α in (0, 1)
pub fn critical_z_for_alpha(alpha: f64, two_sided: bool) -> f64 {
    let alpha = alpha.clamp(1e-10, 1.0 - 1e-10);
    let tail = if two_sided { alpha / 2.0 } else { alpha };
    normal_quantile(1.0 - tail)
}
