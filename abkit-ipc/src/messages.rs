//! Worker Message Types
//!
//! Requests carry a caller-chosen correlation id. Responses echo it back; a
//! cancelled request never produces a response.

use abkit_stats::{
    BayesianConfig, BayesianResult, CurveOptions, DistributionCurves, LookSnapshot,
    SequentialDesign, SequentialStatus, VariantRecord,
};
use serde::{Deserialize, Serialize};

/// A CPU-heavy computation to run off the caller's thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Job {
    /// Posterior simulation of `test` against `control`
    Bayesian {
        /// Control arm
        control: VariantRecord,
        /// Test arm
        test: VariantRecord,
        /// Simulation settings
        #[serde(default)]
        config: BayesianConfig,
    },
    /// Posterior, sampling and lift chart points
    Curves {
        /// Control arm
        control: VariantRecord,
        /// Test arm
        test: VariantRecord,
        /// Curve settings
        #[serde(default)]
        options: CurveOptions,
    },
    /// Sequential status at every supplied look
    SequentialLooks {
        /// Cumulative counts per look
        snapshots: Vec<LookSnapshot>,
        /// Planned design
        #[serde(default)]
        design: SequentialDesign,
    },
}

impl Job {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Bayesian { .. } => "bayesian",
            Job::Curves { .. } => "curves",
            Job::SequentialLooks { .. } => "sequential_looks",
        }
    }
}

/// Request sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    /// Correlation id echoed in the response
    pub id: u64,
    /// Key for the worker's result cache; identical keys skip recomputation
    #[serde(default)]
    pub cache_key: Option<String>,
    /// Work to perform
    pub job: Job,
}

/// Result payload of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "camelCase")]
pub enum JobOutput {
    /// Bayesian analysis result
    Bayesian(BayesianResult),
    /// Chart points
    Curves(DistributionCurves),
    /// One status per look
    SequentialLooks(Vec<SequentialStatus>),
    /// The job was rejected (for example a look beyond the design)
    Failed(String),
}

/// Response sent back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    /// Correlation id of the request
    pub id: u64,
    /// Served from the result cache
    pub cached: bool,
    /// Job result
    pub output: JobOutput,
}

/// Command frame accepted by the stdio worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerCommand {
    /// Queue a request
    Run(WorkerRequest),
    /// Cancel a queued or running request
    Cancel {
        /// Correlation id to cancel
        id: u64,
    },
    /// Finish queued work and exit
    Shutdown,
}
