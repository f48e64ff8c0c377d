//! Experiment Data Model
//!
//! Variant records hold only their raw counts. The conversion rate is derived on
//! every read, so it can never disagree with the counts it came from.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Label of one experiment arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VariantLabel {
    /// First arm, the control by convention
    A,
    /// Second arm
    B,
    /// Third arm
    C,
    /// Fourth arm
    D,
}

impl VariantLabel {
    /// All labels in display order
    pub const ALL: [VariantLabel; 4] = [
        VariantLabel::A,
        VariantLabel::B,
        VariantLabel::C,
        VariantLabel::D,
    ];

    /// Single-letter name
    pub fn as_str(self) -> &'static str {
        match self {
            VariantLabel::A => "A",
            VariantLabel::B => "B",
            VariantLabel::C => "C",
            VariantLabel::D => "D",
        }
    }
}

impl fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for VariantLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(VariantLabel::A),
            "B" => Ok(VariantLabel::B),
            "C" => Ok(VariantLabel::C),
            "D" => Ok(VariantLabel::D),
            other => Err(format!("Unknown variant label: {} (expected A-D)", other)),
        }
    }
}

/// Errors constructing a variant record from counts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Variant {label}: conversions ({conversions}) exceed visitors ({visitors})")]
    ConversionsExceedVisitors {
        label: VariantLabel,
        visitors: u64,
        conversions: u64,
    },
}

/// Observed counts for one arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRecord", into = "RawRecord")]
pub struct VariantRecord {
    label: VariantLabel,
    visitors: u64,
    conversions: u64,
}

#[derive(Serialize, Deserialize)]
struct RawRecord {
    label: VariantLabel,
    visitors: u64,
    conversions: u64,
}

impl TryFrom<RawRecord> for VariantRecord {
    type Error = InputError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        VariantRecord::new(raw.label, raw.visitors, raw.conversions)
    }
}

impl From<VariantRecord> for RawRecord {
    fn from(record: VariantRecord) -> Self {
        RawRecord {
            label: record.label,
            visitors: record.visitors,
            conversions: record.conversions,
        }
    }
}

impl VariantRecord {
    /// Create a record, rejecting `conversions > visitors`
    pub fn new(label: VariantLabel, visitors: u64, conversions: u64) -> Result<Self, InputError> {
        if conversions > visitors {
            return Err(InputError::ConversionsExceedVisitors {
                label,
                visitors,
                conversions,
            });
        }
        Ok(Self {
            label,
            visitors,
            conversions,
        })
    }

    /// Arm label
    pub fn label(&self) -> VariantLabel {
        self.label
    }

    /// Visitor count
    pub fn visitors(&self) -> u64 {
        self.visitors
    }

    /// Conversion count
    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    /// Non-converting visitors
    pub fn failures(&self) -> u64 {
        self.visitors - self.conversions
    }

    /// Whether this arm received any traffic
    pub fn is_active(&self) -> bool {
        self.visitors > 0
    }

    /// Conversion rate as a fraction in [0, 1] (0 when there are no visitors)
    pub fn rate(&self) -> f64 {
        if self.visitors == 0 {
            0.0
        } else {
            self.conversions as f64 / self.visitors as f64
        }
    }

    /// Conversion rate as a percentage: `100 * conversions / visitors`
    pub fn conversion_rate(&self) -> f64 {
        self.rate() * 100.0
    }

    /// Replace the counts, keeping the label
    pub fn with_counts(&self, visitors: u64, conversions: u64) -> Result<Self, InputError> {
        Self::new(self.label, visitors, conversions)
    }
}

/// Confidence level offered to the experimenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ConfidenceLevel {
    /// 90%
    Ninety,
    /// 95%
    #[default]
    NinetyFive,
    /// 99%
    NinetyNine,
}

impl ConfidenceLevel {
    /// Level as a percentage (90, 95 or 99)
    pub fn percent(self) -> u8 {
        match self {
            ConfidenceLevel::Ninety => 90,
            ConfidenceLevel::NinetyFive => 95,
            ConfidenceLevel::NinetyNine => 99,
        }
    }

    /// Level as a fraction
    pub fn fraction(self) -> f64 {
        f64::from(self.percent()) / 100.0
    }

    /// Significance threshold: `1 - level/100`
    pub fn alpha(self) -> f64 {
        match self {
            ConfidenceLevel::Ninety => 0.10,
            ConfidenceLevel::NinetyFive => 0.05,
            ConfidenceLevel::NinetyNine => 0.01,
        }
    }
}

impl TryFrom<u8> for ConfidenceLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            90 => Ok(ConfidenceLevel::Ninety),
            95 => Ok(ConfidenceLevel::NinetyFive),
            99 => Ok(ConfidenceLevel::NinetyNine),
            other => Err(format!(
                "Unsupported confidence level: {} (expected 90, 95 or 99)",
                other
            )),
        }
    }
}

impl From<ConfidenceLevel> for u8 {
    fn from(level: ConfidenceLevel) -> Self {
        level.percent()
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Direction of the alternative hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HypothesisType {
    /// Test arm is better than control
    OneSided,
    /// Test arm differs from control in either direction
    #[default]
    TwoSided,
}

impl HypothesisType {
    /// Whether the rejection region covers both tails
    pub fn is_two_sided(self) -> bool {
        matches!(self, HypothesisType::TwoSided)
    }
}

impl std::str::FromStr for HypothesisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "one-sided" | "one" | "1" => Ok(HypothesisType::OneSided),
            "two-sided" | "two" | "2" => Ok(HypothesisType::TwoSided),
            other => Err(format!("Unknown hypothesis type: {}", other)),
        }
    }
}

/// Settings shared by every comparison in one analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSettings {
    /// Confidence level
    pub confidence_level: ConfidenceLevel,
    /// One- or two-sided alternative
    pub hypothesis_type: HypothesisType,
}

impl TestSettings {
    /// Settings for the given level and hypothesis
    pub fn new(confidence_level: ConfidenceLevel, hypothesis_type: HypothesisType) -> Self {
        Self {
            confidence_level,
            hypothesis_type,
        }
    }

    /// Significance threshold
    pub fn alpha(&self) -> f64 {
        self.confidence_level.alpha()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_rate_is_derived() {
        let record = VariantRecord::new(VariantLabel::A, 200, 10).unwrap();
        assert!((record.conversion_rate() - 5.0).abs() < 1e-12);
        assert!((record.rate() - 0.05).abs() < 1e-12);

        let updated = record.with_counts(400, 10).unwrap();
        assert!((updated.conversion_rate() - 2.5).abs() < 1e-12);
        assert_eq!(updated.label(), VariantLabel::A);
    }

    #[test]
    fn test_zero_visitors_rate() {
        let record = VariantRecord::new(VariantLabel::B, 0, 0).unwrap();
        assert_eq!(record.conversion_rate(), 0.0);
        assert!(!record.is_active());
    }

    #[test]
    fn test_rejects_conversions_over_visitors() {
        assert_eq!(
            VariantRecord::new(VariantLabel::C, 10, 11),
            Err(InputError::ConversionsExceedVisitors {
                label: VariantLabel::C,
                visitors: 10,
                conversions: 11,
            })
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: VariantRecord =
            serde_json::from_str(r#"{"label":"B","visitors":10,"conversions":2}"#).unwrap();
        assert_eq!(ok.conversions(), 2);

        let bad = serde_json::from_str::<VariantRecord>(
            r#"{"label":"B","visitors":1,"conversions":2}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_confidence_level_alpha() {
        assert!((ConfidenceLevel::Ninety.alpha() - 0.10).abs() < f64::EPSILON);
        assert!((ConfidenceLevel::NinetyFive.alpha() - 0.05).abs() < f64::EPSILON);
        assert!((ConfidenceLevel::NinetyNine.alpha() - 0.01).abs() < f64::EPSILON);
        assert!(ConfidenceLevel::try_from(80).is_err());
    }

    #[test]
    fn test_settings_serde_shape() {
        let settings = TestSettings::new(ConfidenceLevel::NinetyNine, HypothesisType::OneSided);
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"confidenceLevel":99,"hypothesisType":"one-sided"}"#);
    }

    #[test]
    fn test_label_parse() {
        assert_eq!("b".parse::<VariantLabel>().unwrap(), VariantLabel::B);
        assert!("E".parse::<VariantLabel>().is_err());
        assert_eq!("two-sided".parse::<HypothesisType>(), Ok(HypothesisType::TwoSided));
    }
}
