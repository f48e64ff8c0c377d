//! JSON Output

use crate::report::AnalysisReport;

/// Generate a prettified JSON report.
pub fn generate_json_report(report: &AnalysisReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
