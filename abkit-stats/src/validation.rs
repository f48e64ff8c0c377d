//! Input Validation
//!
//! Two tiers:
//! - **Blocking**: [`validate_inputs`] turns raw form values into typed records or
//!   returns every field-scoped violation at once. Nothing downstream runs on failure.
//! - **Advisory**: [`advisory_warnings`] flags statistically weak conditions. It
//!   never blocks; warnings are returned next to the results.

use crate::variant::{VariantLabel, VariantRecord};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::fmt;
use thiserror::Error;

/// Fewer visitors than this in an active arm is a high-severity warning
pub const MIN_VISITORS: u64 = 100;
/// Fewer conversions than this is a high-severity warning
pub const MIN_CONVERSIONS_CRITICAL: u64 = 25;
/// Fewer conversions than this (but at least the critical count) is medium severity
pub const MIN_CONVERSIONS: u64 = 30;
/// Conversion rates (%) below this are flagged as extreme
pub const MIN_RATE_PERCENT: f64 = 1.0;
/// Conversion rates (%) above this are flagged as extreme
pub const MAX_RATE_PERCENT: f64 = 99.0;
/// Maximum relative deviation from an equal traffic split
pub const IMBALANCE_TOLERANCE: f64 = 0.20;
/// Chi-square p-value below which the split is a sample ratio mismatch
pub const SRM_P_THRESHOLD: f64 = 0.001;

/// Raw variant values exactly as entered in a form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantInput {
    /// Arm label
    pub label: VariantLabel,
    /// Visitors as entered (must be a non-negative integer)
    pub visitors: f64,
    /// Conversions as entered (must be a non-negative integer ≤ visitors)
    pub conversions: f64,
}

impl VariantInput {
    /// Build an input from integer counts
    pub fn new(label: VariantLabel, visitors: u64, conversions: u64) -> Self {
        Self {
            label,
            visitors: visitors as f64,
            conversions: conversions as f64,
        }
    }
}

/// Field a blocking error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Visitor count of one arm
    Visitors,
    /// Conversion count of one arm
    Conversions,
    /// The variant set as a whole
    Variants,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Visitors => write!(f, "visitors"),
            Field::Conversions => write!(f, "conversions"),
            Field::Variants => write!(f, "variants"),
        }
    }
}

/// Violated rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum FieldErrorKind {
    /// NaN or infinite
    NotFinite,
    /// Below zero
    Negative,
    /// Has a fractional part
    NotInteger,
    /// Conversions larger than visitors
    ExceedsVisitors,
    /// Same label supplied twice
    DuplicateLabel,
    /// Fewer than two arms with visitors
    TooFewActive {
        /// Arms with at least one visitor
        active: usize,
    },
}

/// A blocking, field-scoped validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Arm the error belongs to (None for set-level errors)
    pub label: Option<VariantLabel>,
    /// Offending field
    pub field: Field,
    /// Violated rule
    pub kind: FieldErrorKind,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = self.label {
            write!(f, "variant {} {}: ", label, self.field)?;
        } else {
            write!(f, "{}: ", self.field)?;
        }
        match self.kind {
            FieldErrorKind::NotFinite => write!(f, "must be a finite number"),
            FieldErrorKind::Negative => write!(f, "must not be negative"),
            FieldErrorKind::NotInteger => write!(f, "must be a whole number"),
            FieldErrorKind::ExceedsVisitors => write!(f, "cannot exceed visitors"),
            FieldErrorKind::DuplicateLabel => write!(f, "label supplied more than once"),
            FieldErrorKind::TooFewActive { active } => write!(
                f,
                "at least 2 variants need visitors, found {}",
                active
            ),
        }
    }
}

/// All blocking errors found in one input set
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{} invalid field(s): {}", .errors.len(), join_errors(.errors))]
pub struct ValidationErrors {
    /// Individual violations, in input order
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Errors for one arm
    pub fn for_label(&self, label: VariantLabel) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter(move |e| e.label == Some(label))
    }

    /// Whether any error refers to `(label, field)`
    pub fn has(&self, label: Option<VariantLabel>, field: Field) -> bool {
        self.errors
            .iter()
            .any(|e| e.label == label && e.field == field)
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check a count field, returning it as an integer when valid
fn check_count(
    value: f64,
    label: VariantLabel,
    field: Field,
    errors: &mut Vec<FieldError>,
) -> Option<u64> {
    let kind = if !value.is_finite() {
        Some(FieldErrorKind::NotFinite)
    } else if value < 0.0 {
        Some(FieldErrorKind::Negative)
    } else if value.fract() != 0.0 {
        Some(FieldErrorKind::NotInteger)
    } else if value >= u64::MAX as f64 {
        Some(FieldErrorKind::NotFinite)
    } else {
        None
    };

    match kind {
        Some(kind) => {
            errors.push(FieldError {
                label: Some(label),
                field,
                kind,
            });
            None
        }
        None => Some(value as u64),
    }
}

/// Blocking validation of raw inputs
///
/// Counts must be non-negative integers, conversions ≤ visitors, labels unique,
/// and at least two arms must have visitors.
pub fn validate_inputs(inputs: &[VariantInput]) -> Result<Vec<VariantRecord>, ValidationErrors> {
    let mut errors = Vec::new();
    let mut records = Vec::with_capacity(inputs.len());
    let mut seen = Vec::with_capacity(inputs.len());

    for input in inputs {
        if seen.contains(&input.label) {
            errors.push(FieldError {
                label: Some(input.label),
                field: Field::Variants,
                kind: FieldErrorKind::DuplicateLabel,
            });
            continue;
        }
        seen.push(input.label);

        let visitors = check_count(input.visitors, input.label, Field::Visitors, &mut errors);
        let conversions =
            check_count(input.conversions, input.label, Field::Conversions, &mut errors);

        if let (Some(visitors), Some(conversions)) = (visitors, conversions) {
            match VariantRecord::new(input.label, visitors, conversions) {
                Ok(record) => records.push(record),
                Err(_) => errors.push(FieldError {
                    label: Some(input.label),
                    field: Field::Conversions,
                    kind: FieldErrorKind::ExceedsVisitors,
                }),
            }
        }
    }

    if errors.is_empty() {
        let active = records.iter().filter(|r| r.is_active()).count();
        if active < 2 {
            errors.push(FieldError {
                label: None,
                field: Field::Variants,
                kind: FieldErrorKind::TooFewActive { active },
            });
        }
    }

    if errors.is_empty() {
        Ok(records)
    } else {
        Err(ValidationErrors { errors })
    }
}

/// Warning severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Low,
    /// Results should be read with care
    Medium,
    /// Results are likely unreliable
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Machine-readable warning code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// Too few visitors
    SmallSample,
    /// Too few conversions
    LowConversions,
    /// Conversion rate outside [1%, 99%]
    ExtremeRate,
    /// Traffic deviates more than 20% from an equal split
    TrafficImbalance,
    /// Chi-square test rejects an equal split
    SampleRatioMismatch,
}

impl WarningCode {
    /// Code as shown to users
    pub fn as_str(self) -> &'static str {
        match self {
            WarningCode::SmallSample => "SMALL_SAMPLE",
            WarningCode::LowConversions => "LOW_CONVERSIONS",
            WarningCode::ExtremeRate => "EXTREME_RATE",
            WarningCode::TrafficImbalance => "TRAFFIC_IMBALANCE",
            WarningCode::SampleRatioMismatch => "SAMPLE_RATIO_MISMATCH",
        }
    }
}

/// Advisory warning about the quality of the data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Warning code
    pub code: WarningCode,
    /// Arm the warning is about, if any
    pub variant: Option<VariantLabel>,
    /// What was observed
    pub message: String,
    /// How much it matters
    pub severity: Severity,
    /// What to do about it
    pub recommendation: String,
}

/// Per-arm sample adequacy: visitor counts, conversion counts, extreme rates
pub fn check_sample_adequacy(records: &[VariantRecord]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for record in records.iter().filter(|r| r.is_active()) {
        let label = record.label();

        if record.visitors() < MIN_VISITORS {
            warnings.push(ValidationWarning {
                code: WarningCode::SmallSample,
                variant: Some(label),
                message: format!(
                    "Variant {} has only {} visitors (minimum {})",
                    label,
                    record.visitors(),
                    MIN_VISITORS
                ),
                severity: Severity::High,
                recommendation: "Keep the test running until every variant has at least 100 visitors"
                    .to_string(),
            });
        }

        if record.conversions() < MIN_CONVERSIONS {
            let severity = if record.conversions() < MIN_CONVERSIONS_CRITICAL {
                Severity::High
            } else {
                Severity::Medium
            };
            warnings.push(ValidationWarning {
                code: WarningCode::LowConversions,
                variant: Some(label),
                message: format!(
                    "Variant {} has only {} conversions (recommended at least {})",
                    label,
                    record.conversions(),
                    MIN_CONVERSIONS
                ),
                severity,
                recommendation: "Collect more conversions before trusting the normal approximation"
                    .to_string(),
            });
        }

        let rate = record.conversion_rate();
        if !(MIN_RATE_PERCENT..=MAX_RATE_PERCENT).contains(&rate) {
            warnings.push(ValidationWarning {
                code: WarningCode::ExtremeRate,
                variant: Some(label),
                message: format!(
                    "Variant {} converts at {:.2}%, outside the {}%-{}% range",
                    label, rate, MIN_RATE_PERCENT, MAX_RATE_PERCENT
                ),
                severity: Severity::Medium,
                recommendation: "Extreme rates make Z-test results unreliable; check tracking or use the Bayesian analysis"
                    .to_string(),
            });
        }
    }

    warnings
}

/// Traffic split checks across active arms: 20% imbalance and sample ratio mismatch
pub fn check_traffic_balance(records: &[VariantRecord]) -> Vec<ValidationWarning> {
    let active: Vec<&VariantRecord> = records.iter().filter(|r| r.is_active()).collect();
    if active.len() < 2 {
        return Vec::new();
    }

    let mut warnings = Vec::new();
    let total: f64 = active.iter().map(|r| r.visitors() as f64).sum();
    let expected = total / active.len() as f64;

    let worst = active
        .iter()
        .map(|r| (r, (r.visitors() as f64 - expected).abs() / expected))
        .max_by(|a, b| a.1.total_cmp(&b.1));

    if let Some((record, deviation)) = worst {
        if deviation > IMBALANCE_TOLERANCE {
            warnings.push(ValidationWarning {
                code: WarningCode::TrafficImbalance,
                variant: Some(record.label()),
                message: format!(
                    "Variant {} received {} visitors, {:.1}% away from an equal split ({:.0} expected)",
                    record.label(),
                    record.visitors(),
                    deviation * 100.0,
                    expected
                ),
                severity: Severity::Medium,
                recommendation: "Verify the traffic allocation and randomization".to_string(),
            });
        }
    }

    let chi2: f64 = active
        .iter()
        .map(|r| (r.visitors() as f64 - expected).powi(2) / expected)
        .sum();
    let p = chi_square_sf(chi2, active.len() - 1);
    if p < SRM_P_THRESHOLD {
        warnings.push(ValidationWarning {
            code: WarningCode::SampleRatioMismatch,
            variant: None,
            message: format!(
                "Visitor counts are inconsistent with an equal split (chi-square {:.2}, p = {:.2e})",
                chi2, p
            ),
            severity: Severity::High,
            recommendation: "Investigate assignment or logging bugs before reading results"
                .to_string(),
        });
    }

    warnings
}

/// Every advisory warning for a set of records
pub fn advisory_warnings(records: &[VariantRecord]) -> Vec<ValidationWarning> {
    let mut warnings = check_sample_adequacy(records);
    warnings.extend(check_traffic_balance(records));
    warnings
}

/// Chi-square survival function P(X > x) with `df` degrees of freedom
fn chi_square_sf(x: f64, df: usize) -> f64 {
    if x.is_nan() || x <= 0.0 || df == 0 {
        return 1.0;
    }
    match ChiSquared::new(df as f64) {
        Ok(dist) => dist.sf(x).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}
