//! Frequentist Comparison
//!
//! Two-proportion Z-test with a pooled standard error, power from the pooled and
//! unpooled errors, relative uplift, and Wilson score intervals.
//!
//! Degenerate inputs (an arm without visitors, zero variance) never error. They
//! fall back to `z = 0`, `p = 1`, `power = 0`, so every public number is finite.

use crate::normal::{critical_z, normal_cdf};
use crate::variant::{ConfidenceLevel, HypothesisType, TestSettings, VariantLabel, VariantRecord};
use serde::{Deserialize, Serialize};

/// Relative uplift reported when the control rate is zero but the test rate is not.
///
/// A saturating stand-in for ±infinity: the sign follows the direction of the
/// change and every uplift is clamped to this magnitude.
pub const UPLIFT_SENTINEL: f64 = 999_999.0;

/// Which arm a significant result favours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetterVariant {
    /// Control converts better
    Control,
    /// Test converts better
    Test,
    /// No significant difference
    None,
}

/// Pairwise control-vs-test result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Control arm
    pub control_key: VariantLabel,
    /// Test arm
    pub test_key: VariantLabel,
    /// Control conversion rate (%)
    pub control_rate: f64,
    /// Test conversion rate (%)
    pub test_rate: f64,
    /// `(test - control) / control * 100`, see [`relative_uplift`]
    pub relative_uplift: f64,
    /// Pooled two-proportion Z statistic
    pub z_score: f64,
    /// p-value for the configured hypothesis
    pub p_value: f64,
    /// Statistical power (%)
    pub power: f64,
    /// `p_value < alpha`
    pub is_significant: bool,
    /// Direction of a significant result
    pub better_variant: BetterVariant,
}

/// Confidence interval for a single conversion rate (fractions in [0, 1])
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateInterval {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Wilson center (shrunk toward 0.5)
    pub center: f64,
    /// Confidence level of the interval
    pub level: ConfidenceLevel,
}

/// Interval for the absolute difference `test - control` in percentage points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifferenceInterval {
    /// Observed difference (percentage points)
    pub difference: f64,
    /// Lower bound (percentage points)
    pub lower: f64,
    /// Upper bound (percentage points)
    pub upper: f64,
    /// Confidence level of the interval
    pub level: ConfidenceLevel,
}

/// Pooled standard error `sqrt(p(1-p)(1/n_c + 1/n_t))`, 0 if either arm is empty
pub fn pooled_standard_error(control: &VariantRecord, test: &VariantRecord) -> f64 {
    if !control.is_active() || !test.is_active() {
        return 0.0;
    }
    let n_c = control.visitors() as f64;
    let n_t = test.visitors() as f64;
    let pooled = (control.conversions() as f64 + test.conversions() as f64) / (n_c + n_t);
    finite_or_zero((pooled * (1.0 - pooled) * (1.0 / n_c + 1.0 / n_t)).sqrt())
}

/// Unpooled standard error `sqrt(p_c(1-p_c)/n_c + p_t(1-p_t)/n_t)`
pub fn unpooled_standard_error(control: &VariantRecord, test: &VariantRecord) -> f64 {
    if !control.is_active() || !test.is_active() {
        return 0.0;
    }
    let p_c = control.rate();
    let p_t = test.rate();
    let variance =
        p_c * (1.0 - p_c) / control.visitors() as f64 + p_t * (1.0 - p_t) / test.visitors() as f64;
    finite_or_zero(variance.sqrt())
}

/// Pooled Z statistic; 0 when the standard error is zero or non-finite
pub fn z_score(control: &VariantRecord, test: &VariantRecord) -> f64 {
    let se = pooled_standard_error(control, test);
    if se <= 0.0 {
        return 0.0;
    }
    finite_or_zero((test.rate() - control.rate()) / se)
}

/// p-value for a Z statistic
///
/// One-sided tests only look for improvement: a negative Z yields exactly 1.
pub fn p_value(z: f64, hypothesis: HypothesisType) -> f64 {
    if !z.is_finite() {
        return 1.0;
    }
    let p = match hypothesis {
        HypothesisType::TwoSided => 2.0 * (1.0 - normal_cdf(z.abs())),
        HypothesisType::OneSided if z < 0.0 => 1.0,
        HypothesisType::OneSided => 1.0 - normal_cdf(z),
    };
    p.clamp(0.0, 1.0)
}

/// Power (%) to detect the observed difference at the configured α
///
/// `Φ((|Δ| - z_crit·SE_pooled) / SE_unpooled)`, clamped to [0, 100].
pub fn statistical_power(
    control: &VariantRecord,
    test: &VariantRecord,
    settings: &TestSettings,
) -> f64 {
    let se_pooled = pooled_standard_error(control, test);
    let se_unpooled = unpooled_standard_error(control, test);
    if se_unpooled <= 0.0 {
        return 0.0;
    }

    let effect = (test.rate() - control.rate()).abs();
    let z_crit = critical_z(
        settings.confidence_level,
        settings.hypothesis_type.is_two_sided(),
    );
    let power = normal_cdf((effect - z_crit * se_pooled) / se_unpooled) * 100.0;
    finite_or_zero(power).clamp(0.0, 100.0)
}

/// Relative uplift `(test - control) / control * 100` from two rates in the same unit
///
/// With a zero control rate: 0 when both rates are zero, otherwise
/// ±[`UPLIFT_SENTINEL`] in the direction of the test rate.
pub fn relative_uplift(control_rate: f64, test_rate: f64) -> f64 {
    if control_rate == 0.0 {
        if test_rate == 0.0 {
            return 0.0;
        }
        return UPLIFT_SENTINEL.copysign(test_rate);
    }
    let uplift = (test_rate - control_rate) / control_rate * 100.0;
    if uplift.is_nan() {
        return 0.0;
    }
    uplift.clamp(-UPLIFT_SENTINEL, UPLIFT_SENTINEL)
}

/// Wilson score interval for `conversions / visitors`
///
/// `center = (p + z²/2n) / (1 + z²/n)`,
/// `radius = z·sqrt(p(1-p)/n + z²/4n²) / (1 + z²/n)`.
pub fn wilson_interval(conversions: u64, visitors: u64, level: ConfidenceLevel) -> RateInterval {
    if visitors == 0 {
        return RateInterval {
            lower: 0.0,
            upper: 0.0,
            center: 0.0,
            level,
        };
    }

    let n = visitors as f64;
    let p = (conversions as f64 / n).min(1.0);
    let z = critical_z(level, true);
    let z2 = z * z;

    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let radius = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denominator;

    RateInterval {
        lower: (center - radius).max(0.0),
        upper: (center + radius).min(1.0),
        center,
        level,
    }
}

/// Wilson interval of a record's conversion rate
pub fn rate_interval(record: &VariantRecord, level: ConfidenceLevel) -> RateInterval {
    wilson_interval(record.conversions(), record.visitors(), level)
}

/// Normal-approximation interval for `test - control` using the unpooled error
pub fn difference_interval(
    control: &VariantRecord,
    test: &VariantRecord,
    level: ConfidenceLevel,
) -> DifferenceInterval {
    if !control.is_active() || !test.is_active() {
        return DifferenceInterval {
            difference: 0.0,
            lower: 0.0,
            upper: 0.0,
            level,
        };
    }
    let difference = test.rate() - control.rate();
    let margin = critical_z(level, true) * unpooled_standard_error(control, test);
    DifferenceInterval {
        difference: difference * 100.0,
        lower: (difference - margin) * 100.0,
        upper: (difference + margin) * 100.0,
        level,
    }
}

/// Full pairwise comparison of `test` against `control`
pub fn compare_variants(
    control: &VariantRecord,
    test: &VariantRecord,
    settings: &TestSettings,
) -> Comparison {
    let control_rate = control.conversion_rate();
    let test_rate = test.conversion_rate();
    let relative_uplift = relative_uplift(control_rate, test_rate);

    if !control.is_active() || !test.is_active() {
        return Comparison {
            control_key: control.label(),
            test_key: test.label(),
            control_rate,
            test_rate,
            relative_uplift,
            z_score: 0.0,
            p_value: 1.0,
            power: 0.0,
            is_significant: false,
            better_variant: BetterVariant::None,
        };
    }

    let z = z_score(control, test);
    let p = p_value(z, settings.hypothesis_type);
    let power = statistical_power(control, test, settings);
    let is_significant = p < settings.alpha();

    let better_variant = if !is_significant {
        BetterVariant::None
    } else if test_rate > control_rate {
        BetterVariant::Test
    } else if test_rate < control_rate {
        BetterVariant::Control
    } else {
        BetterVariant::None
    };

    Comparison {
        control_key: control.label(),
        test_key: test.label(),
        control_rate,
        test_rate,
        relative_uplift,
        z_score: z,
        p_value: p,
        power,
        is_significant,
        better_variant,
    }
}

/// Compare every active arm against the first active arm (the control)
pub fn compare_against_control(
    records: &[VariantRecord],
    settings: &TestSettings,
) -> Vec<Comparison> {
    let mut active = records.iter().filter(|r| r.is_active());
    let Some(control) = active.next() else {
        return Vec::new();
    };
    active
        .map(|test| compare_variants(control, test, settings))
        .collect()
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}
