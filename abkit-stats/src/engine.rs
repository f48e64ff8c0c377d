//! Memoizing Analysis Engine
//!
//! Owns one bounded memo cache per function family. Every wrapped function is
//! pure, so entries never go stale; the only invalidation is LRU pressure and
//! an explicit [`AnalysisEngine::clear`].

use crate::frequentist::{compare_variants, rate_interval, Comparison, RateInterval};
use crate::sample_size::{required_sample_size, SampleSizeError, SampleSizeEstimate, SampleSizeInput};
use crate::sequential::{sequential_status, SequentialDesign, SequentialError, SequentialStatus};
use crate::validation::{advisory_warnings, validate_inputs, ValidationErrors, ValidationWarning, VariantInput};
use crate::variant::{ConfidenceLevel, TestSettings, VariantRecord};
use crate::winner::{find_winning_variant, WinnerSummary};
use abkit_cache::{CacheStats, MemoCache};
use serde::{Deserialize, Serialize};

/// Capacity of each memo cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Pairwise comparisons
    pub comparisons: usize,
    /// Wilson rate intervals
    pub intervals: usize,
    /// Sample size estimates
    pub sample_size: usize,
    /// Sequential statuses
    pub sequential: usize,
    /// Winner summaries
    pub winner: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            comparisons: 200,
            intervals: 100,
            sample_size: 50,
            sequential: 100,
            winner: 50,
        }
    }
}

/// Counters of every memo cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Pairwise comparisons
    pub comparisons: CacheStats,
    /// Rate intervals
    pub intervals: CacheStats,
    /// Sample size estimates
    pub sample_size: CacheStats,
    /// Sequential statuses
    pub sequential: CacheStats,
    /// Winner summaries
    pub winner: CacheStats,
}

/// Everything computed from one set of variant inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// Settings used for every comparison
    pub settings: TestSettings,
    /// Validated records in input order
    pub variants: Vec<VariantRecord>,
    /// Wilson interval per record, same order as `variants`
    pub intervals: Vec<RateInterval>,
    /// Advisory warnings
    pub warnings: Vec<ValidationWarning>,
    /// Every active arm against the first active arm
    pub comparisons: Vec<Comparison>,
    /// Winner across all active arms
    pub winner: Option<WinnerSummary>,
}

/// Analysis entry point with per-family memoization
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    comparisons: MemoCache<Comparison>,
    intervals: MemoCache<RateInterval>,
    sample_size: MemoCache<Result<SampleSizeEstimate, SampleSizeError>>,
    sequential: MemoCache<Result<SequentialStatus, SequentialError>>,
    winner: MemoCache<Option<WinnerSummary>>,
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl AnalysisEngine {
    /// Engine with the given cache capacities
    pub fn new(config: CacheConfig) -> Self {
        Self {
            comparisons: MemoCache::new("comparisons", config.comparisons),
            intervals: MemoCache::new("intervals", config.intervals),
            sample_size: MemoCache::new("sample_size", config.sample_size),
            sequential: MemoCache::new("sequential", config.sequential),
            winner: MemoCache::new("winner", config.winner),
        }
    }

    /// Drop every cached value
    pub fn clear(&mut self) {
        self.comparisons.clear();
        self.intervals.clear();
        self.sample_size.clear();
        self.sequential.clear();
        self.winner.clear();
    }

    /// Apply new capacities, evicting as needed
    pub fn set_capacities(&mut self, config: CacheConfig) {
        self.comparisons.set_capacity(config.comparisons);
        self.intervals.set_capacity(config.intervals);
        self.sample_size.set_capacity(config.sample_size);
        self.sequential.set_capacity(config.sequential);
        self.winner.set_capacity(config.winner);
    }

    /// Hit/miss counters per family
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            comparisons: self.comparisons.stats(),
            intervals: self.intervals.stats(),
            sample_size: self.sample_size.stats(),
            sequential: self.sequential.stats(),
            winner: self.winner.stats(),
        }
    }

    /// Memoized [`compare_variants`]
    pub fn compare(
        &mut self,
        control: &VariantRecord,
        test: &VariantRecord,
        settings: &TestSettings,
    ) -> Comparison {
        self.comparisons
            .get_or_insert_with(&(control, test, settings), || {
                compare_variants(control, test, settings)
            })
    }

    /// Memoized [`rate_interval`]
    pub fn rate_interval(&mut self, record: &VariantRecord, level: ConfidenceLevel) -> RateInterval {
        self.intervals
            .get_or_insert_with(&(record, level), || rate_interval(record, level))
    }

    /// Memoized [`required_sample_size`]
    pub fn sample_size(
        &mut self,
        input: &SampleSizeInput,
    ) -> Result<SampleSizeEstimate, SampleSizeError> {
        // Non-finite floats serialize as null and would share a key
        let finite = [input.baseline_rate, input.minimum_detectable_effect, input.power]
            .iter()
            .all(|x| x.is_finite());
        if !finite {
            return required_sample_size(input);
        }
        self.sample_size
            .get_or_insert_with(input, || required_sample_size(input))
    }

    /// Memoized [`sequential_status`]
    pub fn sequential_status(
        &mut self,
        control: &VariantRecord,
        test: &VariantRecord,
        design: &SequentialDesign,
        current_look: u32,
    ) -> Result<SequentialStatus, SequentialError> {
        if !design.target_power.is_finite() {
            return sequential_status(control, test, design, current_look);
        }
        self.sequential
            .get_or_insert_with(&(control, test, design, current_look), || {
                sequential_status(control, test, design, current_look)
            })
    }

    /// Memoized [`find_winning_variant`]
    pub fn winner(
        &mut self,
        records: &[VariantRecord],
        level: ConfidenceLevel,
    ) -> Option<WinnerSummary> {
        self.winner
            .get_or_insert_with(&(records, level), || find_winning_variant(records, level))
    }

    /// Validate raw inputs, then compute warnings, intervals, comparisons and the winner
    ///
    /// Blocking validation errors stop the analysis; warnings never do.
    pub fn analyze(
        &mut self,
        inputs: &[VariantInput],
        settings: &TestSettings,
    ) -> Result<Analysis, ValidationErrors> {
        let variants = validate_inputs(inputs)?;
        let warnings = advisory_warnings(&variants);

        let intervals = variants
            .iter()
            .map(|record| self.rate_interval(record, settings.confidence_level))
            .collect();

        let mut active = variants.iter().filter(|r| r.is_active());
        let comparisons = match active.next() {
            Some(control) => active
                .map(|test| self.compare(control, test, settings))
                .collect(),
            None => Vec::new(),
        };

        let winner = self.winner(&variants, settings.confidence_level);

        tracing::debug!(
            variants = variants.len(),
            warnings = warnings.len(),
            comparisons = comparisons.len(),
            "analysis complete"
        );

        Ok(Analysis {
            settings: *settings,
            variants,
            intervals,
            warnings,
            comparisons,
            winner,
        })
    }
}
