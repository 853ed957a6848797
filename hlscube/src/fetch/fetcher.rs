//! Single (scene, band) tile acquisition.
//!
//! ```text
//! cancelled? ──yes──► Cancelled (no request)
//!     │no
//!     ▼
//! download ◄──backoff── transient error
//!     │          └───── credential error ──► cancel run, Credential
//!     ▼
//! decode GeoTIFF ─► locate ROI window ─► pad into ROI-sized buffer
//!     │
//!     ▼
//! native CRS == ROI CRS ? tile : reproject(tile)
//! ```
//!
//! Decoding and resampling are CPU-bound and run on the blocking pool so
//! they do not stall other downloads.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ndarray::Axis;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::band::StorageType;
use crate::geometry::{PixelGrid, ProjectionError};
use crate::raster::{extract_window, GeoTiff, PixelArray, RasterError, RasterTile, RoiWindow};
use crate::reproject::Reprojector;
use crate::roi::RoiPolygon;
use crate::scene::SceneRecord;

use super::http::{HttpClient, HttpError};
use super::policy::RetryPolicy;
use super::retry::{FailureKind, FetchState, RetryMachine};

/// Why a tile produced no result.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The run was cancelled before or while this tile was being fetched.
    #[error("fetch of {url} skipped: run cancelled")]
    Cancelled { url: String },

    /// The server rejected the bearer token.
    #[error("credential rejected with HTTP {status} for {url}")]
    Credential { url: String, status: u16 },

    /// Transient failures outlasted the retry budget.
    #[error("gave up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: HttpError,
    },

    /// The payload could not be turned into a tile.
    #[error("could not read raster from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: TileError,
    },

    /// The worker or decode task panicked or was aborted.
    #[error("fetch task for {url} failed: {reason}")]
    Task { url: String, reason: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Cancelled { url }
            | FetchError::Credential { url, .. }
            | FetchError::RetriesExhausted { url, .. }
            | FetchError::Read { url, .. }
            | FetchError::Task { url, .. } => url,
        }
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, FetchError::Credential { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

/// Errors turning a downloaded payload into a tile.
#[derive(Debug, Error)]
pub enum TileError {
    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("invalid acquisition time '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Fetches and clips one tile per call.
///
/// The fetcher is shared by every worker of a run; the cancellation token is
/// passed into each call so the first credential failure can stop the rest.
pub struct TileFetcher {
    client: Arc<dyn HttpClient>,
    token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFetcher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl TileFetcher {
    pub fn new(client: Arc<dyn HttpClient>, token: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            token: token.into(),
            retry,
        }
    }

    /// Fetches `record` and clips it to `roi`.
    pub async fn fetch(
        &self,
        roi: &Arc<RoiPolygon>,
        record: &SceneRecord,
        cancel: &CancellationToken,
    ) -> Result<RasterTile, FetchError> {
        let url = record.url.as_str();
        if cancel.is_cancelled() {
            debug!(url, "Run cancelled, skipping fetch");
            return Err(FetchError::Cancelled { url: url.to_string() });
        }

        let time = record.acquired().map_err(|source| FetchError::Read {
            url: url.to_string(),
            source: TileError::Timestamp {
                value: record.datetime.clone(),
                source,
            },
        })?;

        let bytes = self.download(url, cancel).await?;
        debug!(url, bytes = bytes.len(), band = %record.band, "Downloaded tile");

        let roi = Arc::clone(roi);
        let record_owned = record.clone();
        let built = tokio::task::spawn_blocking(move || clip_to_roi(&bytes, &roi, &record_owned, time))
            .await
            .map_err(|e| FetchError::Task {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        built.map_err(|source| {
            warn!(url, error = %source, "Failed to read tile");
            FetchError::Read {
                url: url.to_string(),
                source,
            }
        })
    }

    /// Downloads `url`, retrying transient failures per the retry policy.
    async fn download(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes, FetchError> {
        let mut machine = RetryMachine::new(self.retry.clone());
        let mut payload = None;
        let mut last_error = None;

        loop {
            match machine.state() {
                FetchState::Attempting { attempt } => {
                    if cancel.is_cancelled() {
                        machine.abandon();
                        continue;
                    }
                    match self.client.get_with_bearer(url, &self.token).await {
                        Ok(bytes) => {
                            payload = Some(bytes);
                            machine.succeed();
                        }
                        Err(e) => {
                            let kind = if e.is_credential() {
                                FailureKind::Credential
                            } else {
                                FailureKind::Transient
                            };
                            debug!(url, attempt, error = %e, "Fetch attempt failed");
                            last_error = Some(e);
                            machine.fail(kind);
                        }
                    }
                }
                FetchState::Backoff { attempt, delay } => {
                    warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient fetch failure, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            machine.abandon();
                        }
                        _ = tokio::time::sleep(delay) => {
                            machine.resume();
                        }
                    }
                }
                FetchState::Succeeded => {
                    return payload.ok_or_else(|| FetchError::Cancelled { url: url.to_string() });
                }
                FetchState::Fatal => {
                    let status = match last_error {
                        Some(HttpError::Status { status, .. }) => status,
                        _ => 401,
                    };
                    error!(url, status, "Credential rejected, cancelling run");
                    cancel.cancel();
                    return Err(FetchError::Credential {
                        url: url.to_string(),
                        status,
                    });
                }
                FetchState::Dropped => {
                    return Err(match last_error {
                        Some(last_error) if !cancel.is_cancelled() => {
                            warn!(url, attempts = machine.attempts(), error = %last_error, "Retries exhausted, dropping tile");
                            FetchError::RetriesExhausted {
                                url: url.to_string(),
                                attempts: machine.attempts(),
                                last_error,
                            }
                        }
                        _ => FetchError::Cancelled { url: url.to_string() },
                    });
                }
            }
        }
    }
}

/// Turns a GeoTIFF payload into a tile on the ROI grid.
///
/// The ROI window is located in the raster's own grid, read where it
/// overlaps, and padded with the band's nodata elsewhere. Tiles in another
/// UTM zone than the ROI are then reprojected onto the ROI's grid.
pub fn clip_to_roi(
    bytes: &[u8],
    roi: &RoiPolygon,
    record: &SceneRecord,
    time: DateTime<Utc>,
) -> Result<RasterTile, TileError> {
    let raster = GeoTiff::decode(bytes)?;
    let pixel = raster.transform.truncated_pixel_size();
    if pixel.x < 1.0 || pixel.y < 1.0 {
        return Err(RasterError::InvalidGeometry(format!(
            "pixel size {}x{} truncates to zero",
            raster.transform.a, raster.transform.e
        ))
        .into());
    }

    let bounds = roi.bounds_in(raster.crs)?;
    let window = RoiWindow::locate(&bounds, &raster.transform, pixel)
        .ok_or_else(|| RasterError::InvalidGeometry("singular affine transform".to_string()))?;

    let policy = record.band.storage();
    let read = |idx: usize| raster.value(idx);
    let data = match policy.storage {
        StorageType::UInt8 => PixelArray::UInt8(
            extract_window::<u8, _>(&window, raster.width, raster.height, policy.nodata, read)
                .insert_axis(Axis(0)),
        ),
        StorageType::Int16 => PixelArray::Int16(
            extract_window::<i16, _>(&window, raster.width, raster.height, policy.nodata, read)
                .insert_axis(Axis(0)),
        ),
    };

    let tile = RasterTile {
        band: record.band,
        satellite: record.satellite,
        tile_id: record.tile_id.clone(),
        time,
        crs: raster.crs,
        pixel_size: pixel,
        grid: PixelGrid::covering(&bounds, pixel),
        data,
    };

    if raster.crs == roi.crs() {
        return Ok(tile);
    }
    Ok(Reprojector::new(roi.crs(), pixel).reproject(&tile, roi)?)
}
