//! Region of interest.
//!
//! An ROI is a single GeoJSON `Polygon` in WGS84. On construction it is
//! assigned the UTM zone covering its center and its area is measured as the
//! bounding-box area in that zone. Both values are computed once.
//!
//! # Example
//!
//! ```ignore
//! use hlscube::roi::RoiPolygon;
//!
//! let geometry = serde_json::json!({
//!     "type": "Polygon",
//!     "coordinates": [[[13.3, 52.4], [13.4, 52.4], [13.4, 52.5], [13.3, 52.5], [13.3, 52.4]]]
//! });
//! let roi = RoiPolygon::from_geojson("berlin", &geometry, 500.0)?;
//! assert_eq!(roi.crs().to_string(), "EPSG:32633");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{
    pixel_center_grid, projected_bounds, utm_code_for, BoundingBox, Crs, PixelGrid, PixelSize,
    ProjectionError,
};

/// Default area ceiling in square kilometres.
pub const DEFAULT_MAX_AREA_KM2: f64 = 500.0;

/// Errors raised while constructing an ROI.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoiError {
    /// Geometry is not a single-ring Polygon.
    #[error("invalid ROI geometry: {0}")]
    InvalidGeometry(String),

    /// Projected area exceeds the configured ceiling.
    #[error("ROI area {area_km2} km² exceeds the maximum of {max_area_km2} km²")]
    AreaTooLarge { area_km2: f64, max_area_km2: f64 },

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// GeoJSON geometry object as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: serde_json::Value,
}

/// Validated, immutable region of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiPolygon {
    id: String,
    geometry: Geometry,
    ring: Vec<[f64; 2]>,
    crs: Crs,
    area_km2: f64,
    max_area_km2: f64,
}

impl RoiPolygon {
    /// Validates `geometry` and derives its UTM zone and area.
    pub fn new(id: impl Into<String>, geometry: Geometry, max_area_km2: f64) -> Result<Self, RoiError> {
        if geometry.kind != "Polygon" {
            return Err(RoiError::InvalidGeometry(format!(
                "expected a Polygon, got {}",
                geometry.kind
            )));
        }

        let rings: Vec<Vec<[f64; 2]>> = serde_json::from_value(geometry.coordinates.clone())
            .map_err(|e| RoiError::InvalidGeometry(format!("malformed coordinates: {}", e)))?;
        let ring = match rings.as_slice() {
            [exterior] => exterior.clone(),
            [] => return Err(RoiError::InvalidGeometry("polygon has no rings".to_string())),
            _ => {
                return Err(RoiError::InvalidGeometry(
                    "polygons with holes are not supported".to_string(),
                ))
            }
        };
        if ring.len() < 4 {
            return Err(RoiError::InvalidGeometry(format!(
                "exterior ring needs at least 4 positions, got {}",
                ring.len()
            )));
        }

        let crs = utm_code_for(&ring)
            .ok_or_else(|| RoiError::InvalidGeometry("empty exterior ring".to_string()))?;
        let bounds = projected_bounds(&ring, crs)?;
        let area_km2 = round2(bounds.area() / 1e6);

        if area_km2 > max_area_km2 {
            return Err(RoiError::AreaTooLarge {
                area_km2,
                max_area_km2,
            });
        }

        Ok(Self {
            id: id.into(),
            geometry,
            ring,
            crs,
            area_km2,
            max_area_km2,
        })
    }

    /// Builds an ROI from a raw GeoJSON geometry value.
    pub fn from_geojson(
        id: impl Into<String>,
        value: &serde_json::Value,
        max_area_km2: f64,
    ) -> Result<Self, RoiError> {
        let geometry: Geometry = serde_json::from_value(value.clone())
            .map_err(|e| RoiError::InvalidGeometry(format!("not a GeoJSON geometry: {}", e)))?;
        Self::new(id, geometry, max_area_km2)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Exterior ring as `[lon, lat]` positions.
    pub fn ring(&self) -> &[[f64; 2]] {
        &self.ring
    }

    /// Canonical UTM coordinate system of the ROI.
    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Bounding-box area in km², rounded to two decimals.
    pub fn area_km2(&self) -> f64 {
        self.area_km2
    }

    pub fn max_area_km2(&self) -> f64 {
        self.max_area_km2
    }

    /// Bounding box of the ROI in `crs`.
    pub fn bounds_in(&self, crs: Crs) -> Result<BoundingBox, ProjectionError> {
        projected_bounds(&self.ring, crs)
    }

    /// Pixel-center grid of the ROI in `crs`.
    pub fn grid_in(&self, crs: Crs, pixel: PixelSize) -> Result<PixelGrid, ProjectionError> {
        pixel_center_grid(&self.ring, crs, pixel)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn polygon(lon: f64, lat: f64, size: f64) -> serde_json::Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [lon, lat],
                [lon + size, lat],
                [lon + size, lat + size],
                [lon, lat + size],
                [lon, lat]
            ]]
        })
    }

    #[test]
    fn test_small_polygon_is_accepted() {
        let roi = RoiPolygon::from_geojson("a", &polygon(13.3, 52.4, 0.05), DEFAULT_MAX_AREA_KM2).unwrap();
        assert_eq!(roi.crs(), Crs::new(32633));
        assert!(roi.area_km2() > 15.0 && roi.area_km2() < 25.0, "{}", roi.area_km2());
        assert_eq!(roi.area_km2(), round2(roi.area_km2()));
        assert_eq!(roi.ring().len(), 5);
    }

    #[test]
    fn test_area_too_large_reports_both_values() {
        let err = RoiPolygon::from_geojson("big", &polygon(13.0, 52.0, 0.5), 100.0).unwrap_err();
        match err {
            RoiError::AreaTooLarge {
                area_km2,
                max_area_km2,
            } => {
                assert_eq!(max_area_km2, 100.0);
                assert!(area_km2 > 100.0);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_area_at_ceiling_is_accepted() {
        let roi = RoiPolygon::from_geojson("a", &polygon(13.3, 52.4, 0.05), DEFAULT_MAX_AREA_KM2).unwrap();
        let exact = RoiPolygon::from_geojson("b", &polygon(13.3, 52.4, 0.05), roi.area_km2());
        assert!(exact.is_ok());
    }

    #[test]
    fn test_non_polygon_types_are_rejected() {
        for kind in ["Point", "MultiPolygon", "LineString", "polygon"] {
            let value = json!({ "type": kind, "coordinates": [] });
            let err = RoiPolygon::from_geojson("x", &value, 500.0).unwrap_err();
            assert!(matches!(err, RoiError::InvalidGeometry(_)), "{} -> {:?}", kind, err);
        }
    }

    #[test]
    fn test_holes_are_rejected() {
        let value = json!({
            "type": "Polygon",
            "coordinates": [
                [[13.0, 52.0], [13.1, 52.0], [13.1, 52.1], [13.0, 52.1], [13.0, 52.0]],
                [[13.02, 52.02], [13.05, 52.02], [13.05, 52.05], [13.02, 52.02]]
            ]
        });
        let err = RoiPolygon::from_geojson("x", &value, 500.0).unwrap_err();
        assert!(matches!(err, RoiError::InvalidGeometry(_)));
    }

    #[test]
    fn test_degenerate_ring_is_rejected() {
        let value = json!({ "type": "Polygon", "coordinates": [[[13.0, 52.0], [13.1, 52.0], [13.0, 52.0]]] });
        assert!(matches!(
            RoiPolygon::from_geojson("x", &value, 500.0),
            Err(RoiError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_southern_roi_uses_south_zone() {
        let roi = RoiPolygon::from_geojson("s", &polygon(-47.9, -15.8, 0.05), 500.0).unwrap();
        assert_eq!(roi.crs(), Crs::new(32723));
    }

    #[test]
    fn test_grid_in_native_crs_matches_area() {
        let roi = RoiPolygon::from_geojson("a", &polygon(15.0, 52.0, 0.02), 500.0).unwrap();
        let grid = roi.grid_in(roi.crs(), PixelSize::new(30.0, 30.0)).unwrap();
        let bounds = roi.bounds_in(roi.crs()).unwrap();
        assert_eq!(grid.width(), (bounds.width() / 30.0).floor() as usize);
        assert_eq!(grid.height(), (bounds.height() / 30.0).floor() as usize);
        assert!(grid.x.windows(2).all(|w| w[0] < w[1]));
        assert!(grid.y.windows(2).all(|w| w[0] > w[1]));
    }
}
