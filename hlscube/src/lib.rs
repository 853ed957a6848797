//! hlscube - windowed HLS raster acquisition for a region of interest
//!
//! Fetches Harmonized Landsat Sentinel-2 (HLS) GeoTIFF bands over
//! authenticated HTTPS, clips each one to a polygon ROI, resamples every
//! tile onto one shared UTM pixel grid and merges the results into a
//! time-indexed multi-band cube.
//!
//! ```text
//! RoiPolygon ─┐
//!             ├─► FetchOrchestrator ──► TileFetcher × N ──► RasterTile*
//! SceneRecord*┘        (workers)          (retry, clip,         │
//!                                          reproject)           ▼
//!                                                        DatasetMerger
//!                                                              │
//!                                                              ▼
//!                                                        MergedDataset
//! ```
//!
//! [`HlsProcessor`] wires these together; the pieces are public for callers
//! that need finer control.

pub mod band;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod logging;
pub mod merge;
pub mod orchestrator;
pub mod processor;
pub mod raster;
pub mod reproject;
pub mod roi;
pub mod scene;

pub use band::{Band, BandCatalog, CatalogError, SatelliteId, StoragePolicy, StorageType};
pub use config::{ConfigError, ConfigFile, PipelineConfig};
pub use error::HlsError;
pub use fetch::{FailurePolicy, FetchError, HttpClient, RetryPolicy, TileFetcher};
pub use geometry::{BoundingBox, Crs, PixelGrid, PixelSize};
pub use merge::{DatasetMerger, MergeError, MergedDataset};
pub use orchestrator::{FetchOrchestrator, FetchProgress, FetchReport, FetchStats, PipelineError};
pub use processor::{HlsProcessor, EDL_TOKEN_ENV};
pub use raster::{PixelArray, RasterTile};
pub use reproject::Reprojector;
pub use roi::{RoiError, RoiPolygon};
pub use scene::SceneRecord;
