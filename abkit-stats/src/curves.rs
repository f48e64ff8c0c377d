//! Chart points for the posterior and sampling distributions of two arms.
//!
//! Generating every curve is the expensive path that callers offload to the
//! background worker, so the cancellation token is polled between curves.

use crate::bayesian::{simulate_lifts, BetaPosterior};
use crate::cancel::{CancellationToken, Cancelled};
use crate::normal::normal_pdf;
use crate::percentiles::{percentile_of_sorted, sort_samples};
use crate::variant::{VariantLabel, VariantRecord};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Standard deviations covered on each side of the outermost mean
const RANGE_SIGMAS: f64 = 5.0;

/// Curve generation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveOptions {
    /// Points per curve
    pub points: usize,
    /// Also simulate the relative lift histogram
    pub include_lift: bool,
    /// Draws behind the lift histogram
    pub simulations: usize,
    /// Histogram bins
    pub bins: usize,
    /// Seed for the lift simulation
    pub seed: Option<u64>,
}

impl Default for CurveOptions {
    fn default() -> Self {
        Self {
            points: 200,
            include_lift: false,
            simulations: 20_000,
            bins: 50,
            seed: None,
        }
    }
}

/// One chart point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Conversion rate (fraction)
    pub x: f64,
    /// Density
    pub y: f64,
}

/// Density curve of one arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// Arm
    pub label: VariantLabel,
    /// Points in ascending `x`; empty for an arm without visitors
    pub points: Vec<CurvePoint>,
}

/// Histogram bin over relative lift (%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Inclusive lower edge
    pub start: f64,
    /// Exclusive upper edge (inclusive for the last bin)
    pub end: f64,
    /// Draws in the bin
    pub count: u64,
}

/// Curves for one control/test pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionCurves {
    /// Beta posterior densities, control first
    pub posterior: [Curve; 2],
    /// Normal sampling distributions of the observed rates, control first
    pub sampling: [Curve; 2],
    /// Simulated lift histogram when requested
    pub lift_histogram: Option<Vec<HistogramBin>>,
}

/// Generate every curve for `control` and `test`
pub fn distribution_curves(
    control: &VariantRecord,
    test: &VariantRecord,
    options: &CurveOptions,
    token: &CancellationToken,
) -> Result<DistributionCurves, Cancelled> {
    let xs = shared_range(&[control, test], options.points);

    token.checkpoint()?;
    let control_posterior = posterior_curve(control, &xs);
    token.checkpoint()?;
    let test_posterior = posterior_curve(test, &xs);
    token.checkpoint()?;
    let control_sampling = sampling_curve(control, &xs);
    token.checkpoint()?;
    let test_sampling = sampling_curve(test, &xs);

    let lift_histogram = if options.include_lift {
        token.checkpoint()?;
        let seed = options.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut lifts = simulate_lifts(control, test, options.simulations, seed);
        sort_samples(&mut lifts);
        Some(histogram(&lifts, options.bins))
    } else {
        None
    };

    tracing::debug!(
        points = xs.len(),
        lift = options.include_lift,
        "generated distribution curves"
    );

    Ok(DistributionCurves {
        posterior: [control_posterior, test_posterior],
        sampling: [control_sampling, test_sampling],
        lift_histogram,
    })
}

/// Evenly spaced rates covering every active arm's posterior
fn shared_range(records: &[&VariantRecord], points: usize) -> Vec<f64> {
    let (lo, hi) = records
        .iter()
        .filter(|r| r.is_active())
        .map(|r| BetaPosterior::from_record(r))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), post| {
            let spread = RANGE_SIGMAS * post.std_dev();
            (lo.min(post.mean() - spread), hi.max(post.mean() + spread))
        });

    if points < 2 || !lo.is_finite() || !hi.is_finite() {
        return Vec::new();
    }
    let lo = lo.max(0.0);
    let hi = hi.min(1.0);
    let step = (hi - lo) / (points - 1) as f64;
    (0..points).map(|i| lo + step * i as f64).collect()
}

fn posterior_curve(record: &VariantRecord, xs: &[f64]) -> Curve {
    let points = if record.is_active() {
        let posterior = BetaPosterior::from_record(record);
        xs.iter()
            .map(|&x| CurvePoint {
                x,
                y: posterior.pdf(x),
            })
            .collect()
    } else {
        Vec::new()
    };
    Curve {
        label: record.label(),
        points,
    }
}

fn sampling_curve(record: &VariantRecord, xs: &[f64]) -> Curve {
    let p = record.rate();
    let se = (p * (1.0 - p) / record.visitors() as f64).sqrt();
    let points = if record.is_active() && se > 0.0 && se.is_finite() {
        xs.iter()
            .map(|&x| CurvePoint {
                x,
                y: normal_pdf((x - p) / se) / se,
            })
            .collect()
    } else {
        Vec::new()
    };
    Curve {
        label: record.label(),
        points,
    }
}

/// Equal-width bins over the central 99% of sorted lifts; outliers land in the edge bins
fn histogram(sorted: &[f64], bins: usize) -> Vec<HistogramBin> {
    if sorted.is_empty() || bins == 0 {
        return Vec::new();
    }
    let lo = percentile_of_sorted(sorted, 0.5);
    let hi = percentile_of_sorted(sorted, 99.5);
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut counts = vec![0u64; bins];
    for &lift in sorted {
        let index = ((lift - lo) / width).floor();
        let index = if index.is_nan() { 0.0 } else { index.clamp(0.0, (bins - 1) as f64) };
        counts[index as usize] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + width * i as f64,
            end: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: VariantLabel, visitors: u64, conversions: u64) -> VariantRecord {
        VariantRecord::new(label, visitors, conversions).unwrap()
    }

    #[test]
    fn test_curves_share_x_range() {
        let control = record(VariantLabel::A, 1_000, 50);
        let test = record(VariantLabel::B, 1_000, 80);
        let curves = distribution_curves(
            &control,
            &test,
            &CurveOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap();

        let [c, t] = &curves.posterior;
        assert_eq!(c.points.len(), 200);
        assert_eq!(t.points.len(), 200);
        assert!(c.points.iter().zip(&t.points).all(|(a, b)| a.x == b.x));
        assert!(c.points.windows(2).all(|w| w[0].x < w[1].x));
        assert!(curves.lift_histogram.is_none());

        // Posterior peaks near the observed rates
        let peak = |curve: &Curve| {
            curve
                .points
                .iter()
                .copied()
                .fold(CurvePoint { x: 0.0, y: 0.0 }, |best, p| if p.y > best.y { p } else { best })
                .x
        };
        assert!((peak(c) - 0.05).abs() < 0.005);
        assert!((peak(t) - 0.08).abs() < 0.005);
        assert!((peak(&curves.sampling[1]) - 0.08).abs() < 0.005);
    }

    #[test]
    fn test_lift_histogram_counts_every_draw() {
        let control = record(VariantLabel::A, 2_000, 100);
        let test = record(VariantLabel::B, 2_000, 120);
        let options = CurveOptions {
            include_lift: true,
            simulations: 5_000,
            bins: 20,
            seed: Some(9),
            ..Default::default()
        };
        let curves =
            distribution_curves(&control, &test, &options, &CancellationToken::new()).unwrap();

        let bins = curves.lift_histogram.unwrap();
        assert_eq!(bins.len(), 20);
        assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), 5_000);
        assert!(bins.windows(2).all(|w| (w[0].end - w[1].start).abs() < 1e-9));
    }

    #[test]
    fn test_inactive_arm_has_no_points() {
        let control = record(VariantLabel::A, 0, 0);
        let test = record(VariantLabel::B, 500, 40);
        let curves = distribution_curves(
            &control,
            &test,
            &CurveOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(curves.posterior[0].points.is_empty());
        assert!(curves.sampling[0].points.is_empty());
        assert_eq!(curves.posterior[1].points.len(), 200);
    }

    #[test]
    fn test_cancelled_token_stops_generation() {
        let token = CancellationToken::new();
        token.cancel();
        let control = record(VariantLabel::A, 100, 5);
        let test = record(VariantLabel::B, 100, 7);
        assert_eq!(
            distribution_curves(&control, &test, &CurveOptions::default(), &token),
            Err(Cancelled)
        );
    }
}
