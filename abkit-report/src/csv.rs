//! CSV Output
//!
//! One row per pairwise comparison.

use crate::report::AnalysisReport;
use std::fmt::Write;

const HEADER: &str = "control,test,control_rate,test_rate,relative_uplift,z_score,p_value,power,significant,better_variant";

/// Generate a CSV report of the comparisons
pub fn generate_csv_report(report: &AnalysisReport) -> String {
    let mut output = String::with_capacity(HEADER.len() + 96 * report.comparisons.len());
    output.push_str(HEADER);
    output.push('\n');

    for c in &report.comparisons {
        let better = match c.better_variant {
            abkit_stats::BetterVariant::Control => "control",
            abkit_stats::BetterVariant::Test => "test",
            abkit_stats::BetterVariant::None => "none",
        };
        let _ = writeln!(
            output,
            "{},{},{:.4},{:.4},{:.4},{:.4},{:.6},{:.2},{},{}",
            c.control_key,
            c.test_key,
            c.control_rate,
            c.test_rate,
            c.relative_uplift,
            c.z_score,
            c.p_value,
            c.power,
            c.is_significant,
            better
        );
    }

    output
}
