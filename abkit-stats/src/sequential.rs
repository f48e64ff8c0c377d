//! Group-Sequential Monitoring
//!
//! Alpha spending decides when an interim look may stop for efficacy and a
//! mirrored beta-spending rule decides when it may stop for futility. The engine
//! is stateless: every look is evaluated from the cumulative counts supplied.

use crate::cancel::{CancellationToken, Cancelled};
use crate::frequentist::compare_variants;
use crate::sample_size::{required_sample_size, SampleSizeError, SampleSizeInput, DEFAULT_POWER};
use crate::variant::{ConfidenceLevel, HypothesisType, TestSettings, VariantRecord};
use serde::{Deserialize, Serialize};
use std::f64::consts::{E, FRAC_PI_2};
use std::fmt;
use thiserror::Error;

/// Default number of planned looks
pub const DEFAULT_TOTAL_LOOKS: u32 = 5;

/// Largest look count covered by the inflation tables
pub const MAX_TABULATED_LOOKS: u32 = 10;

/// Maximum-sample-size inflation for Pocock boundaries, indexed by looks - 1
const POCOCK_INFLATION: [f64; 10] = [
    1.000, 1.110, 1.166, 1.202, 1.229, 1.249, 1.265, 1.279, 1.291, 1.301,
];

/// Maximum-sample-size inflation for O'Brien-Fleming boundaries, indexed by looks - 1
const OBRIEN_FLEMING_INFLATION: [f64; 10] = [
    1.000, 1.008, 1.017, 1.024, 1.028, 1.032, 1.035, 1.037, 1.039, 1.040,
];

/// Alpha/beta spending family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpendingFunction {
    /// Spends error evenly across looks
    #[serde(rename = "pocock")]
    Pocock,
    /// Spends little error early and most at the final look
    #[default]
    #[serde(rename = "obrien-fleming")]
    OBrienFleming,
}

impl SpendingFunction {
    /// Cumulative error spent by information fraction `t` out of a budget `total`
    ///
    /// Pocock: `total·ln(1 + (e - 1)t)`. O'Brien-Fleming: `total·(1 - cos(πt/2))`.
    /// Both are 0 at `t = 0` and `total` at `t = 1`.
    pub fn spent(self, t: f64, total: f64) -> f64 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let fraction = match self {
            SpendingFunction::Pocock => (1.0 + (E - 1.0) * t).ln(),
            SpendingFunction::OBrienFleming => 1.0 - (FRAC_PI_2 * t).cos(),
        };
        (total * fraction).clamp(0.0, total)
    }

    /// Efficacy boundary on the p-value at information fraction `t`
    pub fn alpha_spent(self, t: f64, alpha: f64) -> f64 {
        self.spent(t, alpha)
    }

    /// Futility boundary on the p-value: 1 at `t = 0`, falling to `beta` at `t = 1`
    pub fn futility_boundary(self, t: f64, beta: f64) -> f64 {
        1.0 - self.spent(t, 1.0 - beta)
    }

    /// Maximum-sample-size inflation over a fixed design for `looks` looks
    pub fn inflation_factor(self, looks: u32) -> f64 {
        let index = looks.clamp(1, MAX_TABULATED_LOOKS) as usize - 1;
        match self {
            SpendingFunction::Pocock => POCOCK_INFLATION[index],
            SpendingFunction::OBrienFleming => OBRIEN_FLEMING_INFLATION[index],
        }
    }

    /// Name used in configuration files and on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            SpendingFunction::Pocock => "pocock",
            SpendingFunction::OBrienFleming => "obrien-fleming",
        }
    }
}

impl fmt::Display for SpendingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpendingFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pocock" => Ok(SpendingFunction::Pocock),
            "obrien-fleming" | "obrien_fleming" | "obf" => Ok(SpendingFunction::OBrienFleming),
            other => Err(format!("Unknown spending function: {}", other)),
        }
    }
}

/// Planned sequential design
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequentialDesign {
    /// Planned looks, including the final analysis
    pub total_looks: u32,
    /// Boundary family
    pub spending: SpendingFunction,
    /// Confidence level; alpha = 1 - level
    pub confidence_level: ConfidenceLevel,
    /// Target power (%); beta = 1 - power/100
    pub target_power: f64,
}

impl Default for SequentialDesign {
    fn default() -> Self {
        Self {
            total_looks: DEFAULT_TOTAL_LOOKS,
            spending: SpendingFunction::default(),
            confidence_level: ConfidenceLevel::default(),
            target_power: DEFAULT_POWER,
        }
    }
}

impl SequentialDesign {
    /// Overall type I error budget
    pub fn alpha(&self) -> f64 {
        self.confidence_level.alpha()
    }

    /// Overall type II error budget
    pub fn beta(&self) -> f64 {
        (1.0 - self.target_power / 100.0).clamp(0.0, 1.0)
    }

    /// Information fraction of `look`
    pub fn information_fraction(&self, look: u32) -> f64 {
        if self.total_looks == 0 {
            return 0.0;
        }
        f64::from(look.min(self.total_looks)) / f64::from(self.total_looks)
    }

    fn validate(&self) -> Result<(), SequentialError> {
        if self.total_looks == 0 {
            return Err(SequentialError::NoLooks);
        }
        if !(self.target_power > 0.0 && self.target_power < 100.0) {
            return Err(SequentialError::InvalidPower(self.target_power));
        }
        Ok(())
    }
}

/// Sequential monitoring failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequentialError {
    #[error("A sequential design needs at least one look")]
    NoLooks,

    #[error("Look {current} is beyond the planned {total} looks")]
    LookOutOfRange { current: u32, total: u32 },

    #[error("Target power must be between 0 and 100 (exclusive), got {0}")]
    InvalidPower(f64),

    #[error(transparent)]
    SampleSize(#[from] SampleSizeError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Decision state at one look
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequentialStatus {
    /// Look being evaluated (0 = before any data)
    pub current_look: u32,
    /// Planned looks
    pub total_looks: u32,
    /// `current_look / total_looks`
    pub information_fraction: f64,
    /// Two-sided p-value of the cumulative data
    pub p_value: f64,
    /// Power (%) of the cumulative data
    pub power: f64,
    /// Efficacy boundary at this look
    pub alpha_boundary: f64,
    /// Futility boundary at this look
    pub beta_boundary: f64,
    /// `p_value <= alpha_boundary`
    pub can_stop_for_efficacy: bool,
    /// `p_value > beta_boundary`
    pub can_stop_for_futility: bool,
    /// Either stopping rule fired
    pub is_conclusive: bool,
}

/// Evaluate the stopping rules at `current_look` from cumulative counts
pub fn sequential_status(
    control: &VariantRecord,
    test: &VariantRecord,
    design: &SequentialDesign,
    current_look: u32,
) -> Result<SequentialStatus, SequentialError> {
    design.validate()?;
    if current_look > design.total_looks {
        return Err(SequentialError::LookOutOfRange {
            current: current_look,
            total: design.total_looks,
        });
    }

    let settings = TestSettings::new(design.confidence_level, HypothesisType::TwoSided);
    let comparison = compare_variants(control, test, &settings);

    let t = design.information_fraction(current_look);
    let alpha_boundary = design.spending.alpha_spent(t, design.alpha());
    let beta_boundary = design.spending.futility_boundary(t, design.beta());

    // No data has been spent at look 0
    let started = current_look > 0;
    let can_stop_for_efficacy = started && comparison.p_value <= alpha_boundary;
    let can_stop_for_futility = started && comparison.p_value > beta_boundary;

    Ok(SequentialStatus {
        current_look,
        total_looks: design.total_looks,
        information_fraction: t,
        p_value: comparison.p_value,
        power: comparison.power,
        alpha_boundary,
        beta_boundary,
        can_stop_for_efficacy,
        can_stop_for_futility,
        is_conclusive: can_stop_for_efficacy || can_stop_for_futility,
    })
}

/// Boundaries and sample sizes at one planned look
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedLook {
    /// Look number, starting at 1
    pub look: u32,
    /// Information fraction
    pub information_fraction: f64,
    /// Cumulative visitors per variant by this look
    pub cumulative_per_variant: u64,
    /// Efficacy boundary
    pub alpha_boundary: f64,
    /// Futility boundary
    pub beta_boundary: f64,
}

/// Sample-size plan for a sequential design
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookPlan {
    /// Per-variant size of the equivalent fixed design
    pub fixed_sample_size: u64,
    /// Inflation applied for the boundary family and look count
    pub inflation_factor: f64,
    /// Inflated per-variant maximum
    pub max_sample_size: u64,
    /// Per-variant visitors to add between looks
    pub per_look_sample_size: u64,
    /// Every planned look
    pub looks: Vec<PlannedLook>,
}

/// Per-look sample size recommendation for a baseline rate (%) and relative MDE (%)
pub fn plan_looks(
    design: &SequentialDesign,
    baseline_rate: f64,
    minimum_detectable_effect: f64,
) -> Result<LookPlan, SequentialError> {
    design.validate()?;

    let fixed = required_sample_size(&SampleSizeInput {
        baseline_rate,
        minimum_detectable_effect,
        confidence_level: design.confidence_level,
        power: design.target_power,
        hypothesis_type: HypothesisType::TwoSided,
        variants: 2,
    })?
    .per_variant;

    let inflation_factor = design.spending.inflation_factor(design.total_looks);
    let max_sample_size = saturating_ceil(fixed as f64 * inflation_factor);
    let per_look_sample_size = max_sample_size.div_ceil(u64::from(design.total_looks));

    let looks = (1..=design.total_looks)
        .map(|look| {
            let t = design.information_fraction(look);
            PlannedLook {
                look,
                information_fraction: t,
                cumulative_per_variant: per_look_sample_size.saturating_mul(u64::from(look)),
                alpha_boundary: design.spending.alpha_spent(t, design.alpha()),
                beta_boundary: design.spending.futility_boundary(t, design.beta()),
            }
        })
        .collect();

    Ok(LookPlan {
        fixed_sample_size: fixed,
        inflation_factor,
        max_sample_size,
        per_look_sample_size,
        looks,
    })
}

/// Cumulative counts observed at one look
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookSnapshot {
    /// Look number
    pub look: u32,
    /// Cumulative control counts
    pub control: VariantRecord,
    /// Cumulative test counts
    pub test: VariantRecord,
}

/// Evaluate a sequence of looks, checking `token` before each one
pub fn evaluate_looks(
    snapshots: &[LookSnapshot],
    design: &SequentialDesign,
    token: &CancellationToken,
) -> Result<Vec<SequentialStatus>, SequentialError> {
    let mut statuses = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        token.checkpoint()?;
        statuses.push(sequential_status(
            &snapshot.control,
            &snapshot.test,
            design,
            snapshot.look,
        )?);
    }
    tracing::debug!(looks = statuses.len(), "evaluated sequential looks");
    Ok(statuses)
}

fn saturating_ceil(x: f64) -> u64 {
    let x = x.ceil();
    if x.is_finite() && x < u64::MAX as f64 {
        x.max(0.0) as u64
    } else {
        u64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::VariantLabel;

    fn record(label: VariantLabel, visitors: u64, conversions: u64) -> VariantRecord {
        VariantRecord::new(label, visitors, conversions).unwrap()
    }

    #[test]
    fn test_boundaries_at_endpoints() {
        for spending in [SpendingFunction::Pocock, SpendingFunction::OBrienFleming] {
            assert_eq!(spending.alpha_spent(0.0, 0.05), 0.0);
            assert!((spending.alpha_spent(1.0, 0.05) - 0.05).abs() < 1e-12);
            assert!((spending.futility_boundary(0.0, 0.2) - 1.0).abs() < 1e-12);
            assert!((spending.futility_boundary(1.0, 0.2) - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_boundaries_are_monotonic() {
        for spending in [SpendingFunction::Pocock, SpendingFunction::OBrienFleming] {
            let mut last_alpha = 0.0;
            let mut last_beta = 1.0;
            for i in 1..=20 {
                let t = f64::from(i) / 20.0;
                let alpha = spending.alpha_spent(t, 0.05);
                let beta = spending.futility_boundary(t, 0.2);
                assert!(alpha > last_alpha);
                assert!(beta < last_beta);
                last_alpha = alpha;
                last_beta = beta;
            }
        }
    }

    #[test]
    fn test_obrien_fleming_is_conservative_early() {
        let t = 0.2;
        assert!(
            SpendingFunction::OBrienFleming.alpha_spent(t, 0.05)
                < SpendingFunction::Pocock.alpha_spent(t, 0.05)
        );
    }

    #[test]
    fn test_no_stopping_at_look_zero() {
        let control = record(VariantLabel::A, 100_000, 1_000);
        let test = record(VariantLabel::B, 100_000, 3_000);
        let status =
            sequential_status(&control, &test, &SequentialDesign::default(), 0).unwrap();

        assert_eq!(status.information_fraction, 0.0);
        assert_eq!(status.alpha_boundary, 0.0);
        assert_eq!(status.beta_boundary, 1.0);
        assert!(!status.can_stop_for_efficacy);
        assert!(!status.can_stop_for_futility);
        assert!(!status.is_conclusive);
    }

    #[test]
    fn test_strong_effect_stops_for_efficacy() {
        let control = record(VariantLabel::A, 10_000, 500);
        let test = record(VariantLabel::B, 10_000, 700);
        let status =
            sequential_status(&control, &test, &SequentialDesign::default(), 3).unwrap();

        assert!((status.information_fraction - 0.6).abs() < 1e-12);
        assert!(status.p_value < status.alpha_boundary);
        assert!(status.can_stop_for_efficacy);
        assert!(status.is_conclusive);
    }

    #[test]
    fn test_null_effect_stops_for_futility_late() {
        let control = record(VariantLabel::A, 10_000, 500);
        let test = record(VariantLabel::B, 10_000, 502);
        let design = SequentialDesign::default();

        let early = sequential_status(&control, &test, &design, 1).unwrap();
        let last = sequential_status(&control, &test, &design, 5).unwrap();
        assert!(!early.can_stop_for_futility);
        assert!(last.can_stop_for_futility);
        assert!(!last.can_stop_for_efficacy);
    }

    #[test]
    fn test_invalid_looks() {
        let control = record(VariantLabel::A, 100, 5);
        let test = record(VariantLabel::B, 100, 6);
        let design = SequentialDesign::default();

        assert_eq!(
            sequential_status(&control, &test, &design, 6),
            Err(SequentialError::LookOutOfRange { current: 6, total: 5 })
        );
        let empty = SequentialDesign {
            total_looks: 0,
            ..design
        };
        assert_eq!(
            sequential_status(&control, &test, &empty, 0),
            Err(SequentialError::NoLooks)
        );
    }

    #[test]
    fn test_pocock_inflates_more() {
        for looks in 2..=10 {
            assert!(
                SpendingFunction::Pocock.inflation_factor(looks)
                    > SpendingFunction::OBrienFleming.inflation_factor(looks)
            );
        }
        assert_eq!(SpendingFunction::Pocock.inflation_factor(1), 1.0);
        assert_eq!(
            SpendingFunction::Pocock.inflation_factor(25),
            SpendingFunction::Pocock.inflation_factor(10)
        );
    }

    #[test]
    fn test_plan_looks() {
        let design = SequentialDesign::default();
        let plan = plan_looks(&design, 5.0, 20.0).unwrap();

        assert!(plan.fixed_sample_size > 8_000 && plan.fixed_sample_size < 8_300);
        assert!(plan.max_sample_size >= plan.fixed_sample_size);
        assert_eq!(plan.looks.len(), 5);
        assert_eq!(
            plan.per_look_sample_size,
            plan.max_sample_size.div_ceil(5)
        );
        let last = plan.looks.last().unwrap();
        assert_eq!(last.cumulative_per_variant, plan.per_look_sample_size * 5);
        assert!((last.alpha_boundary - 0.05).abs() < 1e-12);

        let pocock = plan_looks(
            &SequentialDesign {
                spending: SpendingFunction::Pocock,
                ..design
            },
            5.0,
            20.0,
        )
        .unwrap();
        assert!(pocock.per_look_sample_size > plan.per_look_sample_size);
    }

    #[test]
    fn test_plan_rejects_bad_inputs() {
        let design = SequentialDesign::default();
        assert!(matches!(
            plan_looks(&design, 0.0, 10.0),
            Err(SequentialError::SampleSize(SampleSizeError::InvalidBaseline(_)))
        ));
        assert_eq!(
            plan_looks(&SequentialDesign { target_power: 0.0, ..design }, 5.0, 10.0),
            Err(SequentialError::InvalidPower(0.0))
        );
    }

    #[test]
    fn test_evaluate_looks_and_cancel() {
        let design = SequentialDesign::default();
        let snapshots: Vec<LookSnapshot> = (1..=3)
            .map(|look| LookSnapshot {
                look,
                control: record(VariantLabel::A, 2_000 * u64::from(look), 100 * u64::from(look)),
                test: record(VariantLabel::B, 2_000 * u64::from(look), 120 * u64::from(look)),
            })
            .collect();

        let token = CancellationToken::new();
        let statuses = evaluate_looks(&snapshots, &design, &token).unwrap();
        assert_eq!(statuses.len(), 3);
        assert!(statuses.windows(2).all(|w| w[0].p_value > w[1].p_value));

        token.cancel();
        assert_eq!(
            evaluate_looks(&snapshots, &design, &token),
            Err(SequentialError::Cancelled(Cancelled))
        );
    }

    #[test]
    fn test_spending_from_str() {
        assert_eq!("pocock".parse::<SpendingFunction>(), Ok(SpendingFunction::Pocock));
        assert_eq!(
            "OBrien-Fleming".parse::<SpendingFunction>(),
            Ok(SpendingFunction::OBrienFleming)
        );
        assert!("linear".parse::<SpendingFunction>().is_err());
    }
}
