//! Fixed-Design Sample Size
//!
//! Per-variant sample size for a two-proportion test:
//!
//! ```text
//! n = (z_α·sqrt(2·p̄(1-p̄)) + z_β·sqrt(p1(1-p1) + p2(1-p2)))² / (p2 - p1)²
//! ```

use crate::normal::{critical_z, normal_quantile};
use crate::variant::{ConfidenceLevel, HypothesisType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default target power (%)
pub const DEFAULT_POWER: f64 = 80.0;

/// Inputs to the sample size calculator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleSizeInput {
    /// Baseline conversion rate (%), exclusive range (0, 100)
    pub baseline_rate: f64,
    /// Relative minimum detectable effect (%), e.g. 10 for a 10% lift
    pub minimum_detectable_effect: f64,
    /// Confidence level
    pub confidence_level: ConfidenceLevel,
    /// Target power (%), exclusive range (0, 100)
    pub power: f64,
    /// One- or two-sided test
    pub hypothesis_type: HypothesisType,
    /// Number of arms sharing traffic (at least 2)
    pub variants: u32,
}

impl Default for SampleSizeInput {
    fn default() -> Self {
        Self {
            baseline_rate: 5.0,
            minimum_detectable_effect: 10.0,
            confidence_level: ConfidenceLevel::default(),
            power: DEFAULT_POWER,
            hypothesis_type: HypothesisType::default(),
            variants: 2,
        }
    }
}

/// Sample size estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleSizeEstimate {
    /// Visitors needed in each arm
    pub per_variant: u64,
    /// Visitors needed across all arms
    pub total: u64,
    /// Expected test rate (%) at the minimum detectable effect
    pub expected_rate: f64,
}

impl SampleSizeEstimate {
    /// Days needed to reach `total` at the given daily traffic (None without traffic)
    pub fn estimated_days(&self, daily_visitors: u64) -> Option<u64> {
        if daily_visitors == 0 {
            return None;
        }
        Some(self.total.div_ceil(daily_visitors))
    }
}

/// Invalid sample size inputs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleSizeError {
    #[error("Baseline rate must be between 0 and 100 (exclusive), got {0}")]
    InvalidBaseline(f64),

    #[error("Minimum detectable effect must be positive, got {0}")]
    InvalidEffect(f64),

    #[error("Expected rate {expected:.4}% is outside (0, 100); lower the detectable effect")]
    EffectOutOfRange { expected: f64 },

    #[error("Power must be between 0 and 100 (exclusive), got {0}")]
    InvalidPower(f64),

    #[error("At least 2 variants are required, got {0}")]
    TooFewVariants(u32),
}

/// Compute the per-variant and total sample size
pub fn required_sample_size(input: &SampleSizeInput) -> Result<SampleSizeEstimate, SampleSizeError> {
    if !(input.baseline_rate > 0.0 && input.baseline_rate < 100.0) {
        return Err(SampleSizeError::InvalidBaseline(input.baseline_rate));
    }
    if !(input.minimum_detectable_effect > 0.0 && input.minimum_detectable_effect.is_finite()) {
        return Err(SampleSizeError::InvalidEffect(input.minimum_detectable_effect));
    }
    if !(input.power > 0.0 && input.power < 100.0) {
        return Err(SampleSizeError::InvalidPower(input.power));
    }
    if input.variants < 2 {
        return Err(SampleSizeError::TooFewVariants(input.variants));
    }

    let p1 = input.baseline_rate / 100.0;
    let p2 = p1 * (1.0 + input.minimum_detectable_effect / 100.0);
    if p2 >= 1.0 {
        return Err(SampleSizeError::EffectOutOfRange {
            expected: p2 * 100.0,
        });
    }

    let per_variant = fixed_sample_size(
        p1,
        p2,
        input.confidence_level,
        input.hypothesis_type.is_two_sided(),
        input.power / 100.0,
    );

    Ok(SampleSizeEstimate {
        per_variant,
        total: per_variant.saturating_mul(u64::from(input.variants)),
        expected_rate: p2 * 100.0,
    })
}

/// Per-arm sample size for rates `p1` → `p2` (fractions) at the given α and power
pub(crate) fn fixed_sample_size(
    p1: f64,
    p2: f64,
    level: ConfidenceLevel,
    two_sided: bool,
    power: f64,
) -> u64 {
    let delta = (p2 - p1).abs();
    if delta == 0.0 {
        return u64::MAX;
    }

    let z_alpha = critical_z(level, two_sided);
    let z_beta = normal_quantile(power.clamp(1e-6, 1.0 - 1e-6));
    let p_bar = (p1 + p2) / 2.0;

    let numerator = z_alpha * (2.0 * p_bar * (1.0 - p_bar)).sqrt()
        + z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
    let n = (numerator * numerator / (delta * delta)).ceil();

    if n.is_finite() && n < u64::MAX as f64 {
        n.max(1.0) as u64
    } else {
        u64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_sample_size() {
        // 5% baseline, 20% relative lift, 95% two-sided, 80% power: ~8,150 per arm
        let input = SampleSizeInput {
            minimum_detectable_effect: 20.0,
            ..Default::default()
        };
        let estimate = required_sample_size(&input).unwrap();

        assert!(estimate.per_variant > 8_000 && estimate.per_variant < 8_300);
        assert_eq!(estimate.total, estimate.per_variant * 2);
        assert!((estimate.expected_rate - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_larger_effect_needs_fewer_visitors() {
        let small = required_sample_size(&SampleSizeInput {
            minimum_detectable_effect: 5.0,
            ..Default::default()
        })
        .unwrap();
        let large = required_sample_size(&SampleSizeInput {
            minimum_detectable_effect: 25.0,
            ..Default::default()
        })
        .unwrap();
        assert!(large.per_variant < small.per_variant);
    }

    #[test]
    fn test_more_power_and_confidence_need_more_visitors() {
        let base = required_sample_size(&SampleSizeInput::default()).unwrap();
        let powered = required_sample_size(&SampleSizeInput {
            power: 90.0,
            ..Default::default()
        })
        .unwrap();
        let strict = required_sample_size(&SampleSizeInput {
            confidence_level: ConfidenceLevel::NinetyNine,
            ..Default::default()
        })
        .unwrap();
        let one_sided = required_sample_size(&SampleSizeInput {
            hypothesis_type: HypothesisType::OneSided,
            ..Default::default()
        })
        .unwrap();

        assert!(powered.per_variant > base.per_variant);
        assert!(strict.per_variant > base.per_variant);
        assert!(one_sided.per_variant < base.per_variant);
    }

    #[test]
    fn test_multi_variant_total() {
        let estimate = required_sample_size(&SampleSizeInput {
            variants: 4,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(estimate.total, estimate.per_variant * 4);
        assert_eq!(estimate.estimated_days(0), None);
        assert_eq!(
            estimate.estimated_days(1_000),
            Some(estimate.total.div_ceil(1_000))
        );
    }

    #[test]
    fn test_invalid_inputs() {
        let bad = |input: SampleSizeInput| required_sample_size(&input).unwrap_err();

        assert!(matches!(
            bad(SampleSizeInput { baseline_rate: 0.0, ..Default::default() }),
            SampleSizeError::InvalidBaseline(_)
        ));
        assert!(matches!(
            bad(SampleSizeInput { minimum_detectable_effect: -1.0, ..Default::default() }),
            SampleSizeError::InvalidEffect(_)
        ));
        assert!(matches!(
            bad(SampleSizeInput { baseline_rate: 60.0, minimum_detectable_effect: 80.0, ..Default::default() }),
            SampleSizeError::EffectOutOfRange { .. }
        ));
        assert!(matches!(
            bad(SampleSizeInput { power: 100.0, ..Default::default() }),
            SampleSizeError::InvalidPower(_)
        ));
        assert!(matches!(
            bad(SampleSizeInput { variants: 1, ..Default::default() }),
            SampleSizeError::TooFewVariants(1)
        ));
    }
}
