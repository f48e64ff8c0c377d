#![warn(missing_docs)]
//! abkit Statistical Engine
//!
//! Pure functions over experiment counts (visitors, conversions per arm):
//! - Normal CDF/quantile approximations and critical Z values
//! - Pooled two-proportion Z-test, power, uplift and Wilson intervals
//! - Blocking input validation and advisory sample-quality warnings
//! - Beta-Binomial posterior simulation with expected loss
//! - Group-sequential alpha/beta spending boundaries
//! - Multi-arm winner selection with a blended confidence score
//!
//! [`AnalysisEngine`] layers bounded memoization over the pure functions.

mod bayesian;
mod cancel;
mod curves;
mod engine;
mod frequentist;
mod normal;
mod percentiles;
mod sample_size;
mod sequential;
mod validation;
mod variant;
mod winner;

pub use bayesian::{
    BayesianConfig, BayesianResult, BetaPosterior, ThresholdProbability, analyze_bayesian,
    analyze_bayesian_cancellable, simulate_lifts,
};
pub use cancel::{CancellationToken, Cancelled};
pub use curves::{
    Curve, CurveOptions, CurvePoint, DistributionCurves, HistogramBin, distribution_curves,
};
pub use engine::{Analysis, AnalysisEngine, CacheConfig, EngineStats};
pub use frequentist::{
    BetterVariant, Comparison, DifferenceInterval, RateInterval, UPLIFT_SENTINEL,
    compare_against_control, compare_variants, difference_interval, p_value,
    pooled_standard_error, rate_interval, relative_uplift, statistical_power,
    unpooled_standard_error, wilson_interval, z_score,
};
pub use normal::{
    Z_CLAMP, critical_z, critical_z_for_alpha, inverse_erf, normal_cdf, normal_pdf,
    normal_quantile, normal_sf,
};
pub use percentiles::{central_interval, compute_percentile, percentile_of_sorted, sort_samples};
pub use sample_size::{
    DEFAULT_POWER, SampleSizeError, SampleSizeEstimate, SampleSizeInput, required_sample_size,
};
pub use sequential::{
    DEFAULT_TOTAL_LOOKS, LookPlan, LookSnapshot, MAX_TABULATED_LOOKS, PlannedLook,
    SequentialDesign, SequentialError, SequentialStatus, SpendingFunction, evaluate_looks,
    plan_looks, sequential_status,
};
pub use validation::{
    Field, FieldError, FieldErrorKind, IMBALANCE_TOLERANCE, MAX_RATE_PERCENT, MIN_CONVERSIONS,
    MIN_CONVERSIONS_CRITICAL, MIN_RATE_PERCENT, MIN_VISITORS, SRM_P_THRESHOLD, Severity,
    ValidationErrors, ValidationWarning, VariantInput, WarningCode, advisory_warnings,
    check_sample_adequacy, check_traffic_balance, validate_inputs,
};
pub use variant::{
    ConfidenceLevel, HypothesisType, InputError, TestSettings, VariantLabel, VariantRecord,
};
pub use winner::{PairwiseWin, WinnerSummary, find_winning_variant};

/// Default posterior draws for the main Bayesian estimates
pub const DEFAULT_SIMULATIONS: usize = 100_000;

/// Default posterior draws for the expected-loss estimate
pub const DEFAULT_LOSS_SIMULATIONS: usize = 10_000;

/// Relative lift thresholds (%) reported by the Bayesian engine
pub const LIFT_THRESHOLDS: [f64; 5] = [0.0, 1.0, 2.0, 5.0, 10.0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_SIMULATIONS, 100_000);
        assert_eq!(DEFAULT_LOSS_SIMULATIONS, 10_000);
        assert!(LIFT_THRESHOLDS.windows(2).all(|w| w[0] < w[1]));
    }
}
