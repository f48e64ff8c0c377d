//! Percentiles of Simulated Draws
//!
//! The Bayesian engine sorts its lift samples once and reads several
//! percentiles from the same buffer, so the primary entry point takes an
//! already-sorted slice.

/// Sort simulated values in place (IEEE total order, so positive NaN sorts last)
pub fn sort_samples(samples: &mut [f64]) {
    samples.sort_unstable_by(f64::total_cmp);
}

/// Percentile of an ascending slice using linear interpolation between ranks
///
/// `percentile` is in [0, 100]. Returns 0.0 for an empty slice.
pub fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    match sorted.len() {
        0 => return 0.0,
        1 => return sorted[0],
        _ => {}
    }

    let n = sorted.len();
    let p = (percentile / 100.0).clamp(0.0, 1.0);

    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (lower_idx + 1).min(n - 1);
    let fraction = rank - lower_idx as f64;

    sorted[lower_idx] + fraction * (sorted[upper_idx] - sorted[lower_idx])
}

/// Percentile of unsorted samples (copies and sorts)
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    let mut sorted = samples.to_vec();
    sort_samples(&mut sorted);
    percentile_of_sorted(&sorted, percentile)
}

/// Equal-tailed interval `[(100-level)/2, 100-(100-level)/2]` of an ascending slice
pub fn central_interval(sorted: &[f64], level_percent: f64) -> (f64, f64) {
    let tail = (100.0 - level_percent) / 2.0;
    (
        percentile_of_sorted(sorted, tail),
        percentile_of_sorted(sorted, 100.0 - tail),
    )
}
