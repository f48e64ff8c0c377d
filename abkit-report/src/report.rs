//! Report Data Structures

use abkit_stats::{
    Analysis, BayesianResult, BetterVariant, Comparison, RateInterval, SequentialStatus,
    Severity, TestSettings, ValidationWarning, VariantLabel, WinnerSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current report schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Complete analysis report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub meta: ReportMeta,
    pub settings: TestSettings,
    pub variants: Vec<VariantSummary>,
    pub warnings: Vec<ValidationWarning>,
    pub comparisons: Vec<Comparison>,
    pub winner: Option<WinnerSummary>,
    pub bayesian: Vec<BayesianEntry>,
    pub sequential: Option<SequentialStatus>,
    pub summary: ReportSummary,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub schema_version: u32,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl ReportMeta {
    /// Metadata stamped with the current time
    pub fn now() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// One arm with its Wilson interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSummary {
    pub label: VariantLabel,
    pub visitors: u64,
    pub conversions: u64,
    /// Conversion rate (%)
    pub conversion_rate: f64,
    pub interval: RateInterval,
}

/// Posterior comparison of one test arm against control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianEntry {
    pub control: VariantLabel,
    pub test: VariantLabel,
    pub result: BayesianResult,
}

/// Headline numbers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub active_variants: usize,
    pub significant_comparisons: usize,
    pub high_severity_warnings: usize,
    pub recommendation: String,
}

impl AnalysisReport {
    /// Build a report from a completed analysis
    pub fn from_analysis(analysis: &Analysis) -> Self {
        let variants = analysis
            .variants
            .iter()
            .zip(&analysis.intervals)
            .map(|(record, interval)| VariantSummary {
                label: record.label(),
                visitors: record.visitors(),
                conversions: record.conversions(),
                conversion_rate: record.conversion_rate(),
                interval: *interval,
            })
            .collect();

        let mut report = Self {
            meta: ReportMeta::now(),
            settings: analysis.settings,
            variants,
            warnings: analysis.warnings.clone(),
            comparisons: analysis.comparisons.clone(),
            winner: analysis.winner.clone(),
            bayesian: Vec::new(),
            sequential: None,
            summary: ReportSummary::default(),
        };
        report.summary = report.summarize(analysis.variants.iter().filter(|r| r.is_active()).count());
        report
    }

    /// Attach a posterior comparison
    pub fn with_bayesian(mut self, control: VariantLabel, test: VariantLabel, result: BayesianResult) -> Self {
        self.bayesian.push(BayesianEntry { control, test, result });
        self
    }

    /// Attach the sequential status of the current look
    pub fn with_sequential(mut self, status: SequentialStatus) -> Self {
        self.sequential = Some(status);
        self
    }

    fn summarize(&self, active_variants: usize) -> ReportSummary {
        let significant: Vec<&Comparison> =
            self.comparisons.iter().filter(|c| c.is_significant).collect();
        let high_severity_warnings = self
            .warnings
            .iter()
            .filter(|w| w.severity == Severity::High)
            .count();

        let recommendation = if high_severity_warnings > 0 {
            "Data quality issues detected; collect more data before deciding".to_string()
        } else if let Some(best) = significant
            .iter()
            .filter(|c| c.better_variant == BetterVariant::Test)
            .max_by(|a, b| a.relative_uplift.total_cmp(&b.relative_uplift))
        {
            format!(
                "Variant {} beats control {} by {:+.2}%",
                best.test_key, best.control_key, best.relative_uplift
            )
        } else if !significant.is_empty() {
            "Control outperforms the tested variants".to_string()
        } else {
            "No significant difference yet; keep the test running".to_string()
        };

        ReportSummary {
            active_variants,
            significant_comparisons: significant.len(),
            high_severity_warnings,
            recommendation,
        }
    }
}
