//! Human-readable terminal output.

use crate::report::AnalysisReport;
use abkit_stats::{BetterVariant, Severity};

/// Format a report for terminal display
pub fn format_human_output(report: &AnalysisReport) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("A/B Test Analysis\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "confidence: {}  hypothesis: {}\n\n",
        report.settings.confidence_level,
        if report.settings.hypothesis_type.is_two_sided() {
            "two-sided"
        } else {
            "one-sided"
        }
    ));

    output.push_str("Variants\n");
    output.push_str(&"-".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "  {:<8}  {:>10}  {:>11}  {:>8}  {}\n",
        "Variant", "Visitors", "Conversions", "Rate", "CI"
    ));
    for v in &report.variants {
        output.push_str(&format!(
            "  {:<8}  {:>10}  {:>11}  {:>7.2}%  [{:.2}%, {:.2}%]\n",
            v.label,
            v.visitors,
            v.conversions,
            v.conversion_rate,
            v.interval.lower * 100.0,
            v.interval.upper * 100.0
        ));
    }

    if !report.comparisons.is_empty() {
        output.push_str("\nComparisons\n");
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for c in &report.comparisons {
            let verdict = match c.better_variant {
                BetterVariant::Test => format!("{} wins", c.test_key),
                BetterVariant::Control => format!("{} wins", c.control_key),
                BetterVariant::None => "not significant".to_string(),
            };
            output.push_str(&format!(
                "  {} vs {}: uplift {:+.2}%  z {:.3}  p {:.4}  power {:.1}%  ({})\n",
                c.test_key, c.control_key, c.relative_uplift, c.z_score, c.p_value, c.power, verdict
            ));
        }
    }

    if let Some(winner) = &report.winner {
        output.push_str(&format!(
            "\nWinner: {} (confidence {:.0}%)\n",
            winner.winner, winner.confidence
        ));
    }

    for entry in &report.bayesian {
        let r = &entry.result;
        output.push_str(&format!("\nBayesian: {} vs {}\n", entry.test, entry.control));
        output.push_str(&"-".repeat(60));
        output.push('\n');
        output.push_str(&format!(
            "  P(improvement): {:.1}%  expected lift: {:+.2}%\n",
            r.probability_of_improvement * 100.0,
            r.expected_lift_percent
        ));
        output.push_str(&format!(
            "  95% credible interval: [{:+.2}%, {:+.2}%]  expected loss: {:.4}%\n",
            r.credible_interval_95[0], r.credible_interval_95[1], r.expected_loss
        ));
        for t in &r.probability_beating_threshold {
            output.push_str(&format!(
                "    P(lift >= {:>2}%): {:.1}%\n",
                t.threshold,
                t.probability * 100.0
            ));
        }
    }

    if let Some(s) = &report.sequential {
        output.push_str(&format!(
            "\nSequential look {}/{} (t = {:.2})\n",
            s.current_look, s.total_looks, s.information_fraction
        ));
        output.push_str(&format!(
            "  p {:.4}  efficacy boundary {:.4}  futility boundary {:.4}\n",
            s.p_value, s.alpha_boundary, s.beta_boundary
        ));
        let decision = if s.can_stop_for_efficacy {
            "stop for efficacy"
        } else if s.can_stop_for_futility {
            "stop for futility"
        } else {
            "continue"
        };
        output.push_str(&format!("  decision: {}\n", decision));
    }

    if !report.warnings.is_empty() {
        output.push_str("\nWarnings\n");
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for w in &report.warnings {
            let icon = match w.severity {
                Severity::High => "✗",
                Severity::Medium => "!",
                Severity::Low => "·",
            };
            output.push_str(&format!("  {} [{}] {}\n", icon, w.code.as_str(), w.message));
            output.push_str(&format!("      {}\n", w.recommendation));
        }
    }

    output.push_str(&format!("\n{}\n", report.summary.recommendation));
    output
}
