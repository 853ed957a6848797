//! Orchestrator types and errors

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::fetch::FetchError;
use crate::merge::MergeError;
use crate::raster::RasterTile;

/// Errors that end a fetch run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The record set was empty or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A fetch had its bearer token rejected; the rest of the run was cancelled.
    ///
    /// Tiles that completed before cancellation are kept in `completed`.
    #[error("credential rejected with HTTP {status} for {url} ({} tiles completed)", .completed.len())]
    Credential {
        url: String,
        status: u16,
        completed: Vec<RasterTile>,
    },

    /// A tile was dropped while running under [`FailurePolicy::Strict`](crate::fetch::FailurePolicy::Strict).
    #[error("tile failed under strict policy: {0}")]
    TileFailed(#[source] FetchError),

    /// The run exceeded its configured time limit.
    #[error("run timed out after {limit:?} with {completed} of {total} tiles fetched")]
    Timeout {
        limit: Duration,
        completed: usize,
        total: usize,
    },

    /// Surviving tiles could not be merged.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Snapshot of run progress, published after every finished fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchProgress {
    /// Tiles produced.
    pub completed: usize,
    /// Tiles dropped after failing.
    pub failed: usize,
    /// Tiles skipped because the run was cancelled.
    pub skipped: usize,
    /// Records in the run.
    pub total: usize,
}

impl FetchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Fetches that have finished one way or another.
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    /// Share of finished fetches, from 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.finished() as f64 / self.total as f64
    }
}

/// Progress callback invoked after every finished fetch.
pub type ProgressCallback = Arc<dyn Fn(FetchProgress) + Send + Sync>;

/// Statistics about a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStats {
    /// Number of records in the run.
    pub total: usize,
    /// Tiles produced.
    pub succeeded: usize,
    /// Tiles that failed and were dropped.
    pub dropped: usize,
    /// Tiles never fetched because the run was cancelled, or still in
    /// flight when the run stopped waiting.
    pub skipped: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// Surviving tiles, in record order.
    pub tiles: Vec<RasterTile>,
    pub stats: FetchStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let mut progress = FetchProgress::new(4);
        assert_eq!(progress.fraction(), 0.0);
        progress.completed = 2;
        progress.failed = 1;
        assert_eq!(progress.finished(), 3);
        assert_eq!(progress.fraction(), 0.75);
        assert_eq!(FetchProgress::new(0).fraction(), 1.0);
    }

    #[test]
    fn test_credential_error_message_counts_completed() {
        let err = PipelineError::Credential {
            url: "https://example.com/a.tif".to_string(),
            status: 403,
            completed: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "credential rejected with HTTP 403 for https://example.com/a.tif (0 tiles completed)"
        );
    }
}
