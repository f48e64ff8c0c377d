//! Bayesian Beta-Binomial Analysis
//!
//! Each arm's conversion rate has posterior `Beta(conversions + 1, failures + 1)`
//! under a flat `Beta(1, 1)` prior. Decision quantities are Monte Carlo estimates
//! over paired posterior draws.
//!
//! Results are stochastic. `BayesianConfig::simulations` trades accuracy against
//! speed; a fixed `seed` makes a run reproducible regardless of the rayon thread
//! count because every chunk of draws owns a deterministically seeded RNG.

use crate::cancel::{CancellationToken, Cancelled};
use crate::frequentist::relative_uplift;
use crate::percentiles::{central_interval, sort_samples};
use crate::variant::VariantRecord;
use crate::{DEFAULT_LOSS_SIMULATIONS, DEFAULT_SIMULATIONS, LIFT_THRESHOLDS};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, Continuous};

/// Draws generated per RNG stream
const CHUNK_SIZE: usize = 4_096;

/// Simulation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BayesianConfig {
    /// Paired draws for probability, lift and thresholds (default: 100,000)
    pub simulations: usize,
    /// Paired draws for the expected-loss estimate (default: 10,000)
    pub loss_simulations: usize,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            simulations: DEFAULT_SIMULATIONS,
            loss_simulations: DEFAULT_LOSS_SIMULATIONS,
            seed: None,
        }
    }
}

/// Beta posterior of one arm's conversion rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaPosterior {
    /// Shape α = conversions + 1
    pub alpha: f64,
    /// Shape β = visitors - conversions + 1
    pub beta: f64,
}

impl BetaPosterior {
    /// Conjugate update of a flat prior with the record's counts
    pub fn from_record(record: &VariantRecord) -> Self {
        Self {
            alpha: record.conversions() as f64 + 1.0,
            beta: record.failures() as f64 + 1.0,
        }
    }

    /// Posterior mean α / (α + β)
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Posterior variance
    pub fn variance(&self) -> f64 {
        let total = self.alpha + self.beta;
        self.alpha * self.beta / (total * total * (total + 1.0))
    }

    /// Posterior standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Posterior density at `x` (0 outside [0, 1] or for degenerate shapes)
    pub fn pdf(&self, x: f64) -> f64 {
        match self.distribution() {
            Some(dist) if (0.0..=1.0).contains(&x) => {
                let density = dist.pdf(x);
                if density.is_finite() { density } else { 0.0 }
            }
            _ => 0.0,
        }
    }

    fn distribution(&self) -> Option<Beta> {
        Beta::new(self.alpha, self.beta).ok()
    }
}

/// Probability that the test arm beats control by at least `threshold` percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProbability {
    /// Relative lift threshold (%)
    pub threshold: f64,
    /// Fraction of draws with `test >= control * (1 + threshold/100)`
    pub probability: f64,
}

/// Posterior comparison of a test arm against control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BayesianResult {
    /// P(test rate > control rate)
    pub probability_of_improvement: f64,
    /// Mean relative lift (%) over all draws
    pub expected_lift_percent: f64,
    /// 2.5th and 97.5th percentiles of the relative lift (%)
    pub credible_interval_95: [f64; 2],
    /// One entry per threshold in [`LIFT_THRESHOLDS`], ascending
    pub probability_beating_threshold: Vec<ThresholdProbability>,
    /// E[max(0, control - test)] in percentage points
    pub expected_loss: f64,
    /// Draws behind the estimates
    pub simulations: usize,
}

impl BayesianResult {
    /// All-zero result used when an arm has no visitors
    pub fn empty() -> Self {
        Self {
            probability_of_improvement: 0.0,
            expected_lift_percent: 0.0,
            credible_interval_95: [0.0, 0.0],
            probability_beating_threshold: LIFT_THRESHOLDS
                .iter()
                .map(|&threshold| ThresholdProbability {
                    threshold,
                    probability: 0.0,
                })
                .collect(),
            expected_loss: 0.0,
            simulations: 0,
        }
    }
}

/// Run the posterior simulation for `test` against `control`
pub fn analyze_bayesian(
    control: &VariantRecord,
    test: &VariantRecord,
    config: &BayesianConfig,
) -> BayesianResult {
    match analyze_bayesian_cancellable(control, test, config, &CancellationToken::new()) {
        Ok(result) => result,
        Err(Cancelled) => BayesianResult::empty(),
    }
}

/// [`analyze_bayesian`] with checkpoints before sampling and before the loss phase
pub fn analyze_bayesian_cancellable(
    control: &VariantRecord,
    test: &VariantRecord,
    config: &BayesianConfig,
    token: &CancellationToken,
) -> Result<BayesianResult, Cancelled> {
    token.checkpoint()?;

    if !control.is_active() || !test.is_active() || config.simulations == 0 {
        return Ok(BayesianResult::empty());
    }

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let control_post = BetaPosterior::from_record(control);
    let test_post = BetaPosterior::from_record(test);
    tracing::debug!(
        simulations = config.simulations,
        loss_simulations = config.loss_simulations,
        seed,
        "running posterior simulation"
    );

    let tally = simulate(&control_post, &test_post, config.simulations, seed);
    token.checkpoint()?;

    let n = tally.draws as f64;
    let mut lifts = tally.lifts;
    sort_samples(&mut lifts);
    let (low, high) = central_interval(&lifts, 95.0);

    let probability_beating_threshold = LIFT_THRESHOLDS
        .iter()
        .zip(tally.threshold_hits.iter())
        .map(|(&threshold, &hits)| ThresholdProbability {
            threshold,
            probability: hits as f64 / n,
        })
        .collect();

    let expected_loss = if test.rate() > control.rate() {
        0.0
    } else {
        expected_loss(&control_post, &test_post, config.loss_simulations, seed ^ LOSS_STREAM)
    };

    Ok(BayesianResult {
        probability_of_improvement: tally.improvements as f64 / n,
        expected_lift_percent: tally.lift_sum / n,
        credible_interval_95: [low, high],
        probability_beating_threshold,
        expected_loss,
        simulations: tally.draws,
    })
}

/// Simulated relative lifts (%) of test over control
pub fn simulate_lifts(
    control: &VariantRecord,
    test: &VariantRecord,
    simulations: usize,
    seed: u64,
) -> Vec<f64> {
    if !control.is_active() || !test.is_active() {
        return Vec::new();
    }
    simulate(
        &BetaPosterior::from_record(control),
        &BetaPosterior::from_record(test),
        simulations,
        seed,
    )
    .lifts
}

/// Seed offset separating the loss draws from the main draws
const LOSS_STREAM: u64 = 0x5DEE_CE66_D1CE_4E5B;

#[derive(Debug, Default)]
struct Tally {
    draws: usize,
    improvements: u64,
    threshold_hits: [u64; LIFT_THRESHOLDS.len()],
    lift_sum: f64,
    lifts: Vec<f64>,
}

impl Tally {
    fn merge(&mut self, other: Tally) {
        self.draws += other.draws;
        self.improvements += other.improvements;
        for (mine, theirs) in self.threshold_hits.iter_mut().zip(other.threshold_hits) {
            *mine += theirs;
        }
        self.lift_sum += other.lift_sum;
        self.lifts.extend(other.lifts);
    }
}

fn simulate(control: &BetaPosterior, test: &BetaPosterior, draws: usize, seed: u64) -> Tally {
    let (Some(control_dist), Some(test_dist)) = (control.distribution(), test.distribution())
    else {
        return Tally::default();
    };

    let chunks: Vec<Tally> = (0..draws.div_ceil(CHUNK_SIZE))
        .into_par_iter()
        .map(|chunk| {
            let len = CHUNK_SIZE.min(draws - chunk * CHUNK_SIZE);
            let mut rng = StdRng::seed_from_u64(chunk_seed(seed, chunk));
            let mut tally = Tally {
                lifts: Vec::with_capacity(len),
                ..Default::default()
            };

            for _ in 0..len {
                let c = control_dist.sample(&mut rng);
                let t = test_dist.sample(&mut rng);

                if t > c {
                    tally.improvements += 1;
                }
                for (hits, threshold) in tally.threshold_hits.iter_mut().zip(LIFT_THRESHOLDS) {
                    if t >= c * (1.0 + threshold / 100.0) {
                        *hits += 1;
                    }
                }
                let lift = relative_uplift(c, t);
                tally.lift_sum += lift;
                tally.lifts.push(lift);
            }
            tally.draws = len;
            tally
        })
        .collect();

    // Sequential merge keeps the float sum independent of scheduling
    let mut total = Tally {
        lifts: Vec::with_capacity(draws),
        ..Default::default()
    };
    for chunk in chunks {
        total.merge(chunk);
    }
    total
}

/// Monte Carlo E[max(0, control - test)] in percentage points
fn expected_loss(control: &BetaPosterior, test: &BetaPosterior, draws: usize, seed: u64) -> f64 {
    if draws == 0 {
        return 0.0;
    }
    let (Some(control_dist), Some(test_dist)) = (control.distribution(), test.distribution())
    else {
        return 0.0;
    };

    let sums: Vec<f64> = (0..draws.div_ceil(CHUNK_SIZE))
        .into_par_iter()
        .map(|chunk| {
            let len = CHUNK_SIZE.min(draws - chunk * CHUNK_SIZE);
            let mut rng = StdRng::seed_from_u64(chunk_seed(seed, chunk));
            (0..len)
                .map(|_| {
                    let c = control_dist.sample(&mut rng);
                    let t = test_dist.sample(&mut rng);
                    (c - t).max(0.0)
                })
                .sum::<f64>()
        })
        .collect();

    sums.iter().sum::<f64>() / draws as f64 * 100.0
}

/// Independent stream seed per chunk (splitmix64 finalizer)
fn chunk_seed(seed: u64, chunk: usize) -> u64 {
    let mut z = seed.wrapping_add((chunk as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::VariantLabel;

    fn record(label: VariantLabel, visitors: u64, conversions: u64) -> VariantRecord {
        VariantRecord::new(label, visitors, conversions).unwrap()
    }

    fn seeded(seed: u64) -> BayesianConfig {
        BayesianConfig {
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_posterior_shape() {
        let posterior = BetaPosterior::from_record(&record(VariantLabel::A, 1_000, 50));
        assert_eq!(posterior.alpha, 51.0);
        assert_eq!(posterior.beta, 951.0);
        assert!((posterior.mean() - 51.0 / 1002.0).abs() < 1e-12);
        assert!(posterior.pdf(0.05) > posterior.pdf(0.2));
        assert_eq!(posterior.pdf(1.5), 0.0);
    }

    #[test]
    fn test_clearly_better_arm() {
        let control = record(VariantLabel::A, 1_000, 50);
        let test = record(VariantLabel::B, 1_000, 100);

        for seed in [1, 2, 3] {
            let result = analyze_bayesian(&control, &test, &seeded(seed));

            assert!(result.probability_of_improvement > 0.99);
            // E[t/c] - 1 ≈ 101.8% for these posteriors
            assert!(
                (result.expected_lift_percent - 101.8).abs() < 4.0,
                "lift {}",
                result.expected_lift_percent
            );
            let [low, high] = result.credible_interval_95;
            assert!(low > 30.0 && low < result.expected_lift_percent);
            assert!(high > result.expected_lift_percent);
            assert_eq!(result.expected_loss, 0.0);
            assert_eq!(result.simulations, DEFAULT_SIMULATIONS);
        }
    }

    #[test]
    fn test_threshold_probabilities_decrease() {
        let control = record(VariantLabel::A, 2_000, 100);
        let test = record(VariantLabel::B, 2_000, 112);
        let result = analyze_bayesian(&control, &test, &seeded(7));

        let probs: Vec<f64> = result
            .probability_beating_threshold
            .iter()
            .map(|t| t.probability)
            .collect();
        assert_eq!(probs.len(), LIFT_THRESHOLDS.len());
        assert!(probs.windows(2).all(|w| w[0] >= w[1]));
        // 0% threshold matches improvement up to ties
        assert!((probs[0] - result.probability_of_improvement).abs() < 1e-3);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let control = record(VariantLabel::A, 5_000, 240);
        let test = record(VariantLabel::B, 5_000, 260);
        let a = analyze_bayesian(&control, &test, &seeded(42));
        let b = analyze_bayesian(&control, &test, &seeded(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_equal_arms_near_coin_flip() {
        let control = record(VariantLabel::A, 4_000, 200);
        let test = record(VariantLabel::B, 4_000, 200);
        let result = analyze_bayesian(&control, &test, &seeded(11));

        assert!((result.probability_of_improvement - 0.5).abs() < 0.02);
        assert!(result.expected_loss > 0.0);
    }

    #[test]
    fn test_expected_loss_when_test_is_worse() {
        let control = record(VariantLabel::A, 1_000, 100);
        let test = record(VariantLabel::B, 1_000, 50);
        let result = analyze_bayesian(&control, &test, &seeded(5));

        assert!(result.probability_of_improvement < 0.01);
        // About 5 percentage points
        assert!(result.expected_loss > 4.0 && result.expected_loss < 6.0);
    }

    #[test]
    fn test_zero_visitors_is_empty() {
        let control = record(VariantLabel::A, 0, 0);
        let test = record(VariantLabel::B, 100, 10);
        let result = analyze_bayesian(&control, &test, &BayesianConfig::default());
        assert_eq!(result, BayesianResult::empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let control = record(VariantLabel::A, 100, 10);
        let test = record(VariantLabel::B, 100, 12);
        let result = analyze_bayesian_cancellable(&control, &test, &seeded(1), &token);
        assert_eq!(result, Err(Cancelled));
    }

    #[test]
    fn test_small_simulation_count() {
        let control = record(VariantLabel::A, 1_000, 50);
        let test = record(VariantLabel::B, 1_000, 60);
        let config = BayesianConfig {
            simulations: 10,
            loss_simulations: 5,
            seed: Some(3),
        };
        let result = analyze_bayesian(&control, &test, &config);
        assert_eq!(result.simulations, 10);
        assert!((0.0..=1.0).contains(&result.probability_of_improvement));
    }

    #[test]
    fn test_chunk_seeds_differ() {
        assert_ne!(chunk_seed(0, 0), chunk_seed(0, 1));
        assert_ne!(chunk_seed(1, 0), chunk_seed(2, 0));
    }
}
