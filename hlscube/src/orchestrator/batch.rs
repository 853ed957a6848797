//! Batch fetch across a bounded worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::fetch::{FailurePolicy, FetchError, TileFetcher};
use crate::raster::RasterTile;
use crate::roi::RoiPolygon;
use crate::scene::SceneRecord;

use super::types::{FetchProgress, FetchReport, FetchStats, PipelineError, ProgressCallback};

/// Default number of concurrent fetches.
pub const DEFAULT_WORKERS: usize = 8;

/// Fans scene records out to a [`TileFetcher`] and collects the tiles.
///
/// Concurrency is bounded by a semaphore sized to the worker count. Every
/// fetch of a run shares one [`CancellationToken`]; it is cancelled by the
/// first credential failure, by the first dropped tile under
/// [`FailurePolicy::Strict`], or when the run timeout elapses. Once cancelled
/// the orchestrator stops waiting: results that are already in are kept,
/// fetches still in flight finish on their own, and queued fetches return
/// without touching the network.
pub struct FetchOrchestrator {
    fetcher: Arc<TileFetcher>,
    workers: usize,
    failure_policy: FailurePolicy,
    run_timeout: Option<Duration>,
}

impl FetchOrchestrator {
    pub fn new(fetcher: Arc<TileFetcher>) -> Self {
        Self {
            fetcher,
            workers: DEFAULT_WORKERS,
            failure_policy: FailurePolicy::default(),
            run_timeout: None,
        }
    }

    /// Sets the worker count (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Fetches every record and returns the tiles that survived.
    pub async fn run(
        &self,
        roi: &Arc<RoiPolygon>,
        records: &[SceneRecord],
        progress: Option<ProgressCallback>,
    ) -> Result<FetchReport, PipelineError> {
        validate_records(records)?;

        let started = Instant::now();
        let total = records.len();
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(self.workers));

        info!(
            records = total,
            workers = self.workers,
            policy = %self.failure_policy,
            roi = roi.id(),
            crs = %roi.crs(),
            "Starting fetch run"
        );

        let mut pending = FuturesUnordered::new();
        for (index, record) in records.iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let roi = Arc::clone(roi);
            let record = record.clone();
            let url = record.url.clone();
            let cancel = cancel.clone();
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = cancel.cancelled() => None,
                };
                fetcher.fetch(&roi, &record, &cancel).await
            });

            pending.push(async move {
                let outcome = handle.await.unwrap_or_else(|e| {
                    Err(FetchError::Task {
                        url,
                        reason: e.to_string(),
                    })
                });
                (index, outcome)
            });
        }

        let mut run = RunState::new(total, self.failure_policy);
        let deadline = expire(self.run_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = pending.next() => {
                    let Some((index, outcome)) = next else {
                        break;
                    };
                    run.record(index, outcome);
                    notify(progress.as_ref(), run.progress);
                    if run.halt.is_some() {
                        break;
                    }
                }
                _ = &mut deadline => {
                    let limit = self.run_timeout.unwrap_or_default();
                    warn!(limit_secs = limit.as_secs(), finished = run.progress.finished(), total, "Run timeout elapsed, cancelling");
                    run.halt = Some(Halt::Timeout(limit));
                    break;
                }
            }
        }

        if run.halt.is_some() {
            cancel.cancel();
            while let Some(Some((index, outcome))) = pending.next().now_or_never() {
                run.record(index, outcome);
            }
            // Anything not yet reported is abandoned.
            run.progress.skipped = total - run.progress.completed - run.progress.failed;
            notify(progress.as_ref(), run.progress);
        }

        let stats = FetchStats {
            total,
            succeeded: run.progress.completed,
            dropped: run.progress.failed,
            skipped: run.progress.skipped,
            elapsed: started.elapsed(),
        };
        info!(
            succeeded = stats.succeeded,
            dropped = stats.dropped,
            skipped = stats.skipped,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Fetch run finished"
        );

        let mut tiles = run.tiles;
        tiles.sort_by_key(|(index, _)| *index);
        let tiles: Vec<RasterTile> = tiles.into_iter().map(|(_, tile)| tile).collect();

        match run.halt {
            None => Ok(FetchReport { tiles, stats }),
            Some(Halt::Credential { url, status }) => {
                error!(url = %url, status, kept = tiles.len(), "Run aborted on rejected credential");
                Err(PipelineError::Credential {
                    url,
                    status,
                    completed: tiles,
                })
            }
            Some(Halt::Strict(e)) => Err(PipelineError::TileFailed(e)),
            Some(Halt::Timeout(limit)) => Err(PipelineError::Timeout {
                limit,
                completed: stats.succeeded,
                total,
            }),
        }
    }
}

/// Rejects empty or malformed record sets before any network activity.
pub fn validate_records(records: &[SceneRecord]) -> Result<(), PipelineError> {
    if records.is_empty() {
        return Err(PipelineError::InvalidInput(
            "no scene records to fetch".to_string(),
        ));
    }
    for (i, record) in records.iter().enumerate() {
        if !(record.url.starts_with("https://") || record.url.starts_with("http://")) {
            return Err(PipelineError::InvalidInput(format!(
                "record {}: '{}' is not an http(s) URL",
                i, record.url
            )));
        }
        if record.tile_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "record {}: empty tile id",
                i
            )));
        }
        if let Err(e) = record.acquired() {
            return Err(PipelineError::InvalidInput(format!(
                "record {}: invalid datetime '{}': {}",
                i, record.datetime, e
            )));
        }
    }
    Ok(())
}

/// Why a run stopped early.
enum Halt {
    Credential { url: String, status: u16 },
    Strict(FetchError),
    Timeout(Duration),
}

struct RunState {
    policy: FailurePolicy,
    progress: FetchProgress,
    tiles: Vec<(usize, RasterTile)>,
    halt: Option<Halt>,
}

impl RunState {
    fn new(total: usize, policy: FailurePolicy) -> Self {
        Self {
            policy,
            progress: FetchProgress::new(total),
            tiles: Vec::new(),
            halt: None,
        }
    }

    fn record(&mut self, index: usize, outcome: Result<RasterTile, FetchError>) {
        match outcome {
            Ok(tile) => {
                debug!(
                    band = %tile.band,
                    tile_id = %tile.tile_id,
                    time = %tile.time,
                    "Tile ready"
                );
                self.progress.completed += 1;
                self.tiles.push((index, tile));
            }
            Err(e) if e.is_cancelled() => {
                self.progress.skipped += 1;
            }
            Err(FetchError::Credential { url, status }) => {
                self.progress.failed += 1;
                // A credential failure outranks any other reason to stop.
                if !matches!(self.halt, Some(Halt::Credential { .. })) {
                    self.halt = Some(Halt::Credential { url, status });
                }
            }
            Err(e) => {
                self.progress.failed += 1;
                warn!(url = e.url(), error = %e, "Dropping tile");
                if self.policy == FailurePolicy::Strict && self.halt.is_none() {
                    self.halt = Some(Halt::Strict(e));
                }
            }
        }
    }
}

fn notify(callback: Option<&ProgressCallback>, progress: FetchProgress) {
    debug!(
        completed = progress.completed,
        failed = progress.failed,
        skipped = progress.skipped,
        total = progress.total,
        "Fetch progress"
    );
    if let Some(callback) = callback {
        callback(progress);
    }
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}
