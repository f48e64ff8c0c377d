//! Cooperative Cancellation
//!
//! Long-running computations take a [`CancellationToken`] and poll it at phase
//! boundaries (between curves, between simulation phases, between looks). Nothing
//! is interrupted mid-phase.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// The computation observed a cancelled token and stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("computation cancelled")]
pub struct Cancelled;

/// Shared flag polled by long-running computations
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// New token in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Visible to every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Checkpoint: `Err(Cancelled)` once cancellation was requested
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
