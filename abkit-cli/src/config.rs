//! Configuration loading from abkit.toml
//!
//! Analysis defaults can be specified in an `abkit.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.

use abkit_ipc::DEFAULT_RESULT_CAPACITY;
use abkit_stats::{
    BayesianConfig, CacheConfig, ConfidenceLevel, DEFAULT_LOSS_SIMULATIONS, DEFAULT_POWER,
    DEFAULT_SIMULATIONS, DEFAULT_TOTAL_LOOKS, HypothesisType, SequentialDesign, SpendingFunction,
    TestSettings,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file name
pub const CONFIG_FILE: &str = "abkit.toml";

/// abkit configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AbkitConfig {
    /// Frequentist test settings
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Posterior simulation settings
    #[serde(default)]
    pub bayesian: BayesianSection,
    /// Sequential design
    #[serde(default)]
    pub sequential: SequentialSection,
    /// Cache capacities
    #[serde(default)]
    pub cache: CacheSection,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Frequentist test settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct AnalysisConfig {
    /// Confidence level: 90, 95 or 99
    #[serde(default)]
    pub confidence_level: ConfidenceLevel,
    /// "one-sided" or "two-sided"
    #[serde(default)]
    pub hypothesis: HypothesisType,
}

/// Posterior simulation settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BayesianSection {
    /// Draws for probability, lift and thresholds
    #[serde(default = "default_simulations")]
    pub simulations: usize,
    /// Draws for the expected-loss estimate
    #[serde(default = "default_loss_simulations")]
    pub loss_simulations: usize,
    /// Fixed seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for BayesianSection {
    fn default() -> Self {
        Self {
            simulations: default_simulations(),
            loss_simulations: default_loss_simulations(),
            seed: None,
        }
    }
}

fn default_simulations() -> usize {
    DEFAULT_SIMULATIONS
}
fn default_loss_simulations() -> usize {
    DEFAULT_LOSS_SIMULATIONS
}

/// Sequential design
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SequentialSection {
    /// Planned looks
    #[serde(default = "default_total_looks")]
    pub total_looks: u32,
    /// "pocock" or "obrien-fleming"
    #[serde(default)]
    pub spending: SpendingFunction,
    /// Target power (%)
    #[serde(default = "default_power")]
    pub target_power: f64,
}

impl Default for SequentialSection {
    fn default() -> Self {
        Self {
            total_looks: default_total_looks(),
            spending: SpendingFunction::default(),
            target_power: default_power(),
        }
    }
}

fn default_total_looks() -> u32 {
    DEFAULT_TOTAL_LOOKS
}
fn default_power() -> f64 {
    DEFAULT_POWER
}

/// Cache capacities
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheSection {
    /// Pairwise comparisons
    #[serde(default = "default_comparisons")]
    pub comparisons: usize,
    /// Rate intervals
    #[serde(default = "default_intervals")]
    pub intervals: usize,
    /// Sample size estimates
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Sequential statuses
    #[serde(default = "default_sequential")]
    pub sequential: usize,
    /// Winner summaries
    #[serde(default = "default_winner")]
    pub winner: usize,
    /// Worker result cache
    #[serde(default = "default_results")]
    pub results: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            comparisons: default_comparisons(),
            intervals: default_intervals(),
            sample_size: default_sample_size(),
            sequential: default_sequential(),
            winner: default_winner(),
            results: default_results(),
        }
    }
}

fn default_comparisons() -> usize {
    CacheConfig::default().comparisons
}
fn default_intervals() -> usize {
    CacheConfig::default().intervals
}
fn default_sample_size() -> usize {
    CacheConfig::default().sample_size
}
fn default_sequential() -> usize {
    CacheConfig::default().sequential
}
fn default_winner() -> usize {
    CacheConfig::default().winner
}
fn default_results() -> usize {
    DEFAULT_RESULT_CAPACITY
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json", "csv"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl AbkitConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find `abkit.toml` by walking up from `start`
    pub fn find_from(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let dir = std::env::current_dir().ok()?;
        let path = Self::find_from(&dir)?;
        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    /// Frequentist settings
    pub fn test_settings(&self) -> TestSettings {
        TestSettings::new(self.analysis.confidence_level, self.analysis.hypothesis)
    }

    /// Simulation settings
    pub fn bayesian_config(&self) -> BayesianConfig {
        BayesianConfig {
            simulations: self.bayesian.simulations,
            loss_simulations: self.bayesian.loss_simulations,
            seed: self.bayesian.seed,
        }
    }

    /// Sequential design at the configured confidence level
    pub fn sequential_design(&self) -> SequentialDesign {
        SequentialDesign {
            total_looks: self.sequential.total_looks,
            spending: self.sequential.spending,
            confidence_level: self.analysis.confidence_level,
            target_power: self.sequential.target_power,
        }
    }

    /// Memo cache capacities
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            comparisons: self.cache.comparisons,
            intervals: self.cache.intervals,
            sample_size: self.cache.sample_size,
            sequential: self.cache.sequential,
            winner: self.cache.winner,
        }
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# abkit Configuration

[analysis]
# Confidence level: 90, 95 or 99
confidence_level = 95
# "one-sided" or "two-sided"
hypothesis = "two-sided"

[bayesian]
# Posterior draws for probability, lift and thresholds
simulations = 100000
# Posterior draws for the expected-loss estimate
loss_simulations = 10000
# Fixed seed for reproducible runs (uncomment to enable)
# seed = 42

[sequential]
# Planned looks, including the final analysis
total_looks = 5
# Boundary family: "pocock" or "obrien-fleming"
spending = "obrien-fleming"
# Target power (%)
target_power = 80.0

[cache]
# Memoization capacities per function family
comparisons = 200
intervals = 100
sample_size = 50
sequential = 100
winner = 50
# Worker result cache
results = 20

[output]
# Default output format: human, json, csv
format = "human"
"#
        .to_string()
    }
}
