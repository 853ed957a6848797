//! Scene records: one row per (scene, band) pair to fetch.
//!
//! Records normally come from a catalog search. They can also be built
//! directly from an LP DAAC granule id, which encodes the sensor family and
//! MGRS tile:
//!
//! ```text
//! HLS.S30.T33UUP.2023123T101559.v2.0
//!  │   │    │
//!  │   │    └── tile id
//!  │   └─────── satellite id
//!  └─────────── product prefix
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::band::{Band, BandCatalog, CatalogError, SatelliteId};

/// Timestamp layout of scene acquisition times.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Root of the protected LP DAAC data store.
pub const LPDAAC_DATA_ROOT: &str = "https://data.lpdaac.earthdatacloud.nasa.gov/lp-prod-protected";

/// A single (scene, band) raster to acquire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub satellite: SatelliteId,
    pub tile_id: String,
    /// Acquisition time as reported by the catalog.
    pub datetime: String,
    pub band: Band,
    pub url: String,
}

impl SceneRecord {
    /// Builds the record for one band of a granule.
    pub fn for_granule(
        granule_id: &str,
        datetime: &str,
        band: Band,
        catalog: &BandCatalog,
    ) -> Result<Self, CatalogError> {
        let parts: Vec<&str> = granule_id.split('.').collect();
        if parts.len() < 4 || parts[0] != "HLS" || parts[2].is_empty() {
            return Err(CatalogError::MalformedGranuleId(granule_id.to_string()));
        }
        let satellite: SatelliteId = parts[1].parse()?;
        let code = catalog
            .code(satellite, band)
            .ok_or_else(|| CatalogError::InvalidBand(band.name().to_string()))?;

        let base_path = format!("{}{}.020", parts[0], parts[1]);
        let url = format!(
            "{}/{}/{}/{}.{}.tif",
            LPDAAC_DATA_ROOT, base_path, granule_id, granule_id, code
        );

        Ok(Self {
            satellite,
            tile_id: parts[2].to_string(),
            datetime: datetime.to_string(),
            band,
            url,
        })
    }

    /// Parses the acquisition timestamp.
    pub fn acquired(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        parse_datetime(&self.datetime)
    }

    /// Grouping key used when merging.
    pub fn group_key(&self) -> (SatelliteId, &str) {
        (self.satellite, self.tile_id.as_str())
    }
}

/// Expands a granule into one record per requested band, in band order.
pub fn expand_granule(
    granule_id: &str,
    datetime: &str,
    bands: &[Band],
    catalog: &BandCatalog,
) -> Result<Vec<SceneRecord>, CatalogError> {
    bands
        .iter()
        .map(|band| SceneRecord::for_granule(granule_id, datetime, *band, catalog))
        .collect()
}

/// Parses a catalog timestamp such as `2023-05-03T10:15:59.123Z`.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).map(|naive| naive.and_utc())
}
