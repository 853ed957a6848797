//! Fetch orchestration
//!
//! Dispatches one tile fetch per scene record across a bounded worker pool
//! and collects the tiles that survive, applying the run's failure policy.

mod batch;
mod types;

pub use batch::{validate_records, FetchOrchestrator, DEFAULT_WORKERS};
pub use types::{FetchProgress, FetchReport, FetchStats, PipelineError, ProgressCallback};
