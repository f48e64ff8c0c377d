#![warn(missing_docs)]
//! # abkit
//!
//! Statistical analysis engine for A/B tests over raw visitor and conversion counts.
//!
//! - **Frequentist**: pooled two-proportion Z-test, power, relative uplift, Wilson intervals
//! - **Validation**: blocking field-scoped input errors plus advisory sample-quality warnings
//! - **Bayesian**: Beta-Binomial posterior simulation with credible intervals and expected loss
//! - **Sequential**: Pocock and O'Brien-Fleming spending boundaries with stop/continue decisions
//! - **Winner**: multi-arm candidate selection with a blended confidence score
//! - **Offload**: a background worker with cooperative cancellation and a result cache
//!
//! ## Quick Start
//!
//! ```ignore
//! use abkit::prelude::*;
//!
//! let mut engine = AnalysisEngine::default();
//! let inputs = [
//!     VariantInput::new(VariantLabel::A, 10_000, 500),
//!     VariantInput::new(VariantLabel::B, 10_000, 600),
//! ];
//! let analysis = engine.analyze(&inputs, &TestSettings::default())?;
//! assert!(analysis.comparisons[0].is_significant);
//! ```

// Re-export the engine
pub use abkit_stats::*;

// Re-export caching
pub use abkit_cache::{CacheStats, LruCache, MemoCache, Memoized, cache_key};

// Re-export offload types
pub use abkit_ipc::{
    BackgroundWorker, Job, JobOutput, Worker, WorkerCommand, WorkerError, WorkerRequest,
    WorkerResponse,
};

// Re-export reports
pub use abkit_report::{
    AnalysisReport, OutputFormat, format_human_output, generate_csv_report, generate_json_report,
    render,
};

/// Run the abkit CLI
pub use abkit_cli::run;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AnalysisEngine, BayesianConfig, Comparison, ConfidenceLevel, HypothesisType,
        SequentialDesign, SpendingFunction, TestSettings, VariantInput, VariantLabel,
        VariantRecord, analyze_bayesian, compare_variants, sequential_status,
    };
}
