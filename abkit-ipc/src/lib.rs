#![warn(missing_docs)]
//! abkit Offload Protocol
//!
//! Moves CPU-heavy analysis (posterior simulation, chart curves, sequential
//! look sweeps) off the caller's thread. Requests carry a correlation id and
//! can be cancelled cooperatively; completed results are kept in a bounded
//! cache keyed by a caller-supplied key. The same requests can be served over
//! stdin/stdout as length-prefixed JSON frames.

mod framing;
mod messages;
mod worker;

pub use framing::{
    FrameError, FrameReader, FrameWriter, MAX_COMMAND_FRAME, MAX_RESPONSE_FRAME, read_frame,
    write_frame,
};
pub use messages::{Job, JobOutput, WorkerCommand, WorkerRequest, WorkerResponse};
pub use worker::{BackgroundWorker, DEFAULT_RESULT_CAPACITY, Worker, WorkerError, run_stdio};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;
