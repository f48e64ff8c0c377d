//! Winning-Variant Aggregation
//!
//! The arm with the highest conversion rate is the candidate. Its one-sided
//! p-values against every other active arm are averaged and blended with the
//! configured confidence level into a single score.

use crate::frequentist::{p_value, z_score};
use crate::variant::{ConfidenceLevel, HypothesisType, VariantLabel, VariantRecord};
use serde::{Deserialize, Serialize};

/// Candidate winner against one other arm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairwiseWin {
    /// Arm the winner is compared against
    pub opponent: VariantLabel,
    /// Pooled Z statistic of winner over opponent
    pub z_score: f64,
    /// One-sided p-value of the winner beating the opponent
    pub p_value: f64,
}

/// Winner and blended confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerSummary {
    /// Arm with the highest conversion rate
    pub winner: VariantLabel,
    /// Blended confidence score (%), never above the configured level
    pub confidence: f64,
    /// Mean of the pairwise one-sided p-values
    pub average_p_value: f64,
    /// One entry per other active arm
    pub pairwise: Vec<PairwiseWin>,
}

/// Pick the winning arm; `None` with fewer than two active arms
///
/// Ties on the rate keep the earliest arm.
pub fn find_winning_variant(
    records: &[VariantRecord],
    level: ConfidenceLevel,
) -> Option<WinnerSummary> {
    let active: Vec<&VariantRecord> = records.iter().filter(|r| r.is_active()).collect();
    if active.len() < 2 {
        return None;
    }

    let mut winner = active[0];
    for &candidate in &active[1..] {
        if candidate.rate() > winner.rate() {
            winner = candidate;
        }
    }

    let pairwise: Vec<PairwiseWin> = active
        .iter()
        .filter(|r| r.label() != winner.label())
        .map(|opponent| {
            let z = z_score(opponent, winner);
            PairwiseWin {
                opponent: opponent.label(),
                z_score: z,
                p_value: p_value(z, HypothesisType::OneSided),
            }
        })
        .collect();

    let average_p_value =
        pairwise.iter().map(|p| p.p_value).sum::<f64>() / pairwise.len() as f64;
    let base = f64::from(level.percent());
    let blended = (1.0 - average_p_value) * 100.0;
    let confidence = ((blended + base) / 2.0).round().min(base);

    Some(WinnerSummary {
        winner: winner.label(),
        confidence,
        average_p_value,
        pairwise,
    })
}
