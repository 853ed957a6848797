//! Satellite families, canonical bands and their storage policy.
//!
//! HLS ships two harmonized products: `L30` (Landsat 8/9 OLI) and `S30`
//! (Sentinel-2 MSI). Both are exposed through the same eight canonical
//! bands, but each family names its source files with its own band codes.
//!
//! ```text
//! Band::Nir ──► BandCatalog ──► L30: "B05"
//!                           └─► S30: "B8A"
//! ```
//!
//! The storage policy of every band (pixel type and nodata sentinel) is
//! looked up in a static table keyed by [`Band`], so no component needs to
//! compare band names to decide how to treat the quality mask.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when parsing catalog identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Collection name is not one of the supported HLS v2.0 collections.
    #[error("unsupported collection '{0}', expected one of HLSL30.v2.0, HLSS30.v2.0")]
    InvalidCollection(String),

    /// Band name is not one of the canonical bands.
    #[error("unsupported band '{0}', expected one of CA, BLUE, GREEN, RED, NIR, SWIR1, SWIR2, FMASK")]
    InvalidBand(String),

    /// Satellite identifier is neither L30 nor S30.
    #[error("unsupported satellite '{0}', expected L30 or S30")]
    InvalidSatellite(String),

    /// Granule identifier does not follow the `HLS.<sat>.<tile>.<date>...` layout.
    #[error("malformed granule id '{0}'")]
    MalformedGranuleId(String),
}

// =============================================================================
// Satellite
// =============================================================================

/// HLS sensor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SatelliteId {
    /// Landsat 8/9 harmonized product.
    L30,
    /// Sentinel-2 harmonized product.
    S30,
}

impl SatelliteId {
    /// All supported sensor families.
    pub const ALL: [SatelliteId; 2] = [SatelliteId::L30, SatelliteId::S30];

    /// Short identifier as it appears in granule ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            SatelliteId::L30 => "L30",
            SatelliteId::S30 => "S30",
        }
    }

    /// CMR collection short name for this family.
    pub fn collection(&self) -> &'static str {
        match self {
            SatelliteId::L30 => "HLSL30.v2.0",
            SatelliteId::S30 => "HLSS30.v2.0",
        }
    }

    /// Value written to the per-time-step satellite channel when families are mixed.
    pub fn discriminator(&self) -> u8 {
        match self {
            SatelliteId::L30 => 0,
            SatelliteId::S30 => 1,
        }
    }

    /// Resolves a collection name such as `HLSS30.v2.0`.
    pub fn from_collection(collection: &str) -> Result<Self, CatalogError> {
        Self::ALL
            .into_iter()
            .find(|sat| sat.collection() == collection)
            .ok_or_else(|| CatalogError::InvalidCollection(collection.to_string()))
    }
}

impl fmt::Display for SatelliteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SatelliteId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L30" => Ok(SatelliteId::L30),
            "S30" => Ok(SatelliteId::S30),
            _ => Err(CatalogError::InvalidSatellite(s.to_string())),
        }
    }
}

// =============================================================================
// Band
// =============================================================================

/// Canonical HLS band, shared by both sensor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "CA")]
    Coastal,
    #[serde(rename = "BLUE")]
    Blue,
    #[serde(rename = "GREEN")]
    Green,
    #[serde(rename = "RED")]
    Red,
    #[serde(rename = "NIR")]
    Nir,
    #[serde(rename = "SWIR1")]
    Swir1,
    #[serde(rename = "SWIR2")]
    Swir2,
    /// Fmask quality layer.
    #[serde(rename = "FMASK")]
    Fmask,
}

impl Band {
    /// All canonical bands in catalog order.
    pub const ALL: [Band; 8] = [
        Band::Coastal,
        Band::Blue,
        Band::Green,
        Band::Red,
        Band::Nir,
        Band::Swir1,
        Band::Swir2,
        Band::Fmask,
    ];

    /// Canonical band name used as the variable name in merged datasets.
    pub fn name(&self) -> &'static str {
        match self {
            Band::Coastal => "CA",
            Band::Blue => "BLUE",
            Band::Green => "GREEN",
            Band::Red => "RED",
            Band::Nir => "NIR",
            Band::Swir1 => "SWIR1",
            Band::Swir2 => "SWIR2",
            Band::Fmask => "FMASK",
        }
    }

    /// Storage policy for this band.
    pub fn storage(&self) -> &'static StoragePolicy {
        match self {
            Band::Fmask => &MASK_STORAGE,
            _ => &REFLECTANCE_STORAGE,
        }
    }

    /// Nodata sentinel for this band.
    pub fn nodata(&self) -> f64 {
        self.storage().nodata
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Band {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|band| band.name() == upper)
            .ok_or_else(|| CatalogError::InvalidBand(s.to_string()))
    }
}

// =============================================================================
// Storage policy
// =============================================================================

/// Pixel storage width used for a band once it leaves the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    UInt8,
    Int16,
}

/// How a band is stored and which value marks missing pixels.
///
/// The nodata value is used both as the fill for padded windows and as the
/// source/destination nodata during reprojection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoragePolicy {
    pub storage: StorageType,
    pub nodata: f64,
}

static MASK_STORAGE: StoragePolicy = StoragePolicy {
    storage: StorageType::UInt8,
    nodata: 255.0,
};

static REFLECTANCE_STORAGE: StoragePolicy = StoragePolicy {
    storage: StorageType::Int16,
    nodata: -9999.0,
};

// =============================================================================
// Band catalog
// =============================================================================

/// Mapping from (sensor family, canonical band) to the source band code.
///
/// Defaults follow the LP DAAC HLS v2.0 file naming. Additional families or
/// remapped codes can be registered with [`BandCatalog::with_code`].
#[derive(Debug, Clone, PartialEq)]
pub struct BandCatalog {
    codes: HashMap<(SatelliteId, Band), String>,
}

impl Default for BandCatalog {
    fn default() -> Self {
        const L30: [&str; 8] = ["B01", "B02", "B03", "B04", "B05", "B06", "B07", "Fmask"];
        const S30: [&str; 8] = ["B01", "B02", "B03", "B04", "B8A", "B11", "B12", "Fmask"];

        let mut codes = HashMap::with_capacity(16);
        for (band, code) in Band::ALL.into_iter().zip(L30) {
            codes.insert((SatelliteId::L30, band), code.to_string());
        }
        for (band, code) in Band::ALL.into_iter().zip(S30) {
            codes.insert((SatelliteId::S30, band), code.to_string());
        }
        Self { codes }
    }
}

impl BandCatalog {
    /// Registers or replaces the source code for a band.
    pub fn with_code(mut self, satellite: SatelliteId, band: Band, code: impl Into<String>) -> Self {
        self.codes.insert((satellite, band), code.into());
        self
    }

    /// Source band code, e.g. `B8A` for Sentinel-2 NIR.
    pub fn code(&self, satellite: SatelliteId, band: Band) -> Option<&str> {
        self.codes.get(&(satellite, band)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_codes_differ_per_family() {
        let catalog = BandCatalog::default();
        assert_eq!(catalog.code(SatelliteId::L30, Band::Nir), Some("B05"));
        assert_eq!(catalog.code(SatelliteId::S30, Band::Nir), Some("B8A"));
        assert_eq!(catalog.code(SatelliteId::S30, Band::Swir2), Some("B12"));
        assert_eq!(catalog.code(SatelliteId::L30, Band::Fmask), Some("Fmask"));
    }

    #[test]
    fn test_catalog_override() {
        let catalog = BandCatalog::default().with_code(SatelliteId::L30, Band::Nir, "B5X");
        assert_eq!(catalog.code(SatelliteId::L30, Band::Nir), Some("B5X"));
        assert_eq!(catalog.code(SatelliteId::S30, Band::Nir), Some("B8A"));
    }

    #[test]
    fn test_storage_policy_table() {
        assert_eq!(Band::Fmask.storage().storage, StorageType::UInt8);
        assert_eq!(Band::Fmask.nodata(), 255.0);
        for band in Band::ALL.into_iter().filter(|b| *b != Band::Fmask) {
            assert_eq!(band.storage().storage, StorageType::Int16);
            assert_eq!(band.nodata(), -9999.0);
        }
    }

    #[test]
    fn test_band_parse() {
        assert_eq!("nir".parse::<Band>().unwrap(), Band::Nir);
        assert_eq!("CA".parse::<Band>().unwrap(), Band::Coastal);
        assert_eq!(
            "B05".parse::<Band>(),
            Err(CatalogError::InvalidBand("B05".to_string()))
        );
    }

    #[test]
    fn test_collection_lookup() {
        assert_eq!(
            SatelliteId::from_collection("HLSS30.v2.0").unwrap(),
            SatelliteId::S30
        );
        assert!(matches!(
            SatelliteId::from_collection("HLSS30.v1.5"),
            Err(CatalogError::InvalidCollection(_))
        ));
    }

    #[test]
    fn test_discriminator_values() {
        assert_eq!(SatelliteId::L30.discriminator(), 0);
        assert_eq!(SatelliteId::S30.discriminator(), 1);
    }

    #[test]
    fn test_band_serde_uses_canonical_names() {
        let json = serde_json::to_string(&Band::Coastal).unwrap();
        assert_eq!(json, "\"CA\"");
        let band: Band = serde_json::from_str("\"SWIR1\"").unwrap();
        assert_eq!(band, Band::Swir1);
    }
}
