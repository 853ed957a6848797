//! End-to-end pipeline: fetch every scene record, then merge.
//!
//! # Example
//!
//! ```ignore
//! use hlscube::{HlsProcessor, PipelineConfig, RoiPolygon};
//!
//! let roi = RoiPolygon::from_geojson("field-7", &geojson, 500.0)?;
//! let processor = HlsProcessor::new(roi, None, PipelineConfig::default())?;
//! match processor.process(&records, None).await? {
//!     Some(cube) => println!("{} time steps", cube.time_steps()),
//!     None => println!("no tile survived"),
//! }
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::HlsError;
use crate::fetch::{HttpClient, ReqwestClient, TileFetcher};
use crate::merge::{DatasetMerger, MergedDataset};
use crate::orchestrator::{FetchOrchestrator, FetchReport, PipelineError, ProgressCallback};
use crate::roi::RoiPolygon;
use crate::scene::SceneRecord;

/// Environment variable holding the Earthdata Login bearer token.
pub const EDL_TOKEN_ENV: &str = "EDL_TOKEN";

/// Runs fetch and merge for one ROI.
pub struct HlsProcessor {
    roi: Arc<RoiPolygon>,
    config: PipelineConfig,
    orchestrator: FetchOrchestrator,
    merger: DatasetMerger,
}

impl HlsProcessor {
    /// Creates a processor backed by a reqwest client.
    ///
    /// The token is taken from `token` or, failing that, from `EDL_TOKEN`.
    pub fn new(roi: RoiPolygon, token: Option<String>, config: PipelineConfig) -> Result<Self, HlsError> {
        let token = resolve_token(token)?;
        let client = ReqwestClient::with_timeout(config.http_timeout)?;
        Ok(Self::with_client(roi, Arc::new(client), token, config))
    }

    /// Builds the ROI from GeoJSON using the configured area ceiling.
    pub fn from_geojson(
        id: &str,
        geometry: &serde_json::Value,
        token: Option<String>,
        config: PipelineConfig,
    ) -> Result<Self, HlsError> {
        let roi = RoiPolygon::from_geojson(id, geometry, config.max_area_km2)?;
        Self::new(roi, token, config)
    }

    /// Creates a processor around an existing HTTP client.
    pub fn with_client(
        roi: RoiPolygon,
        client: Arc<dyn HttpClient>,
        token: impl Into<String>,
        config: PipelineConfig,
    ) -> Self {
        let fetcher = TileFetcher::new(client, token, config.retry.clone());
        let orchestrator = FetchOrchestrator::new(Arc::new(fetcher))
            .with_workers(config.workers)
            .with_failure_policy(config.failure_policy)
            .with_run_timeout(config.run_timeout);
        Self {
            roi: Arc::new(roi),
            config,
            orchestrator,
            merger: DatasetMerger::new(),
        }
    }

    pub fn roi(&self) -> &RoiPolygon {
        &self.roi
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches every record without merging.
    pub async fn fetch(
        &self,
        records: &[SceneRecord],
        progress: Option<ProgressCallback>,
    ) -> Result<FetchReport, HlsError> {
        Ok(self.orchestrator.run(&self.roi, records, progress).await?)
    }

    /// Fetches and merges. Returns `None` when no tile survived.
    pub async fn process(
        &self,
        records: &[SceneRecord],
        progress: Option<ProgressCallback>,
    ) -> Result<Option<MergedDataset>, HlsError> {
        let report = self.fetch(records, progress).await?;
        if report.tiles.is_empty() {
            warn!(
                records = records.len(),
                dropped = report.stats.dropped,
                "No tile survived, nothing to merge"
            );
            return Ok(None);
        }

        let merged = self
            .merger
            .merge(report.tiles, records)
            .map_err(PipelineError::from)?;
        info!(
            roi = self.roi.id(),
            time_steps = merged.time_steps(),
            bands = merged.bands.len(),
            "Processing complete"
        );
        Ok(Some(merged))
    }
}

/// Picks the explicit token if non-empty, else `EDL_TOKEN`.
pub fn resolve_token(explicit: Option<String>) -> Result<String, HlsError> {
    explicit
        .filter(|t| !t.trim().is_empty())
        .or_else(|| std::env::var(EDL_TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()))
        .ok_or(HlsError::MissingToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::{Band, SatelliteId, StorageType};
    use crate::fetch::http::tests::{status, MockHttpClient};
    use crate::fetch::RetryPolicy;
    use crate::raster::geotiff::tests::{encode_i16, encode_u8};
    use bytes::Bytes;
    use serde_json::json;

    fn roi() -> RoiPolygon {
        let value = json!({
            "type": "Polygon",
            "coordinates": [[[15.0, 52.0], [15.01, 52.0], [15.01, 52.01], [15.0, 52.01], [15.0, 52.0]]]
        });
        RoiPolygon::from_geojson("proc", &value, 500.0).unwrap()
    }

    fn origin(roi: &RoiPolygon) -> (f64, f64) {
        let bounds = roi.bounds_in(roi.crs()).unwrap();
        (
            (bounds.min_x / 30.0).floor() * 30.0 - 300.0,
            (bounds.max_y / 30.0).ceil() * 30.0 + 300.0,
        )
    }

    fn record(band: Band) -> SceneRecord {
        SceneRecord {
            satellite: SatelliteId::S30,
            tile_id: "T33UUP".to_string(),
            datetime: "2023-05-03T10:15:59.024Z".to_string(),
            band,
            url: format!("https://example.com/{}.tif", band),
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_retry(RetryPolicy::None)
    }

    #[test]
    fn test_explicit_token_wins() {
        assert_eq!(resolve_token(Some("abc".to_string())).unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_process_merges_bands() {
        let roi = roi();
        let o = origin(&roi);
        let epsg = roi.crs().epsg();
        let records = vec![record(Band::Red), record(Band::Fmask)];
        let client = MockHttpClient::new()
            .respond(&records[0].url, Ok(Bytes::from(encode_i16(60, 60, &[900; 3600], o, 30.0, epsg))))
            .respond(&records[1].url, Ok(Bytes::from(encode_u8(60, 60, &[1; 3600], o, 30.0, epsg))));

        let processor = HlsProcessor::with_client(roi, Arc::new(client), "token", config());
        let merged = processor.process(&records, None).await.unwrap().unwrap();

        assert_eq!(merged.time_steps(), 1);
        assert_eq!(merged.band(Band::Red).unwrap().storage(), StorageType::Int16);
        assert_eq!(merged.band(Band::Fmask).unwrap().storage(), StorageType::UInt8);
        assert_eq!(merged.crs, processor.roi().crs());
    }

    #[tokio::test]
    async fn test_no_surviving_tiles_is_none() {
        let records = vec![record(Band::Red)];
        let client = MockHttpClient::new().respond(&records[0].url, status(500));
        let processor = HlsProcessor::with_client(roi(), Arc::new(client), "token", config());
        assert!(processor.process(&records, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credential_failure_is_distinct_error() {
        let records = vec![record(Band::Red)];
        let client = MockHttpClient::new().respond(&records[0].url, status(401));
        let processor = HlsProcessor::with_client(roi(), Arc::new(client), "token", config());
        let err = processor.process(&records, None).await.unwrap_err();
        assert!(err.is_credential());
    }

    #[test]
    fn test_roi_area_ceiling_from_config() {
        let big = json!({
            "type": "Polygon",
            "coordinates": [[[15.0, 52.0], [15.5, 52.0], [15.5, 52.5], [15.0, 52.5], [15.0, 52.0]]]
        });
        let result = HlsProcessor::from_geojson("big", &big, Some("t".to_string()), config().with_max_area_km2(10.0));
        assert!(matches!(result, Err(HlsError::Roi(_))));
    }
}
