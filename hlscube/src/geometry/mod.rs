//! Geometry and projection helpers shared by the ROI model, the tile
//! fetcher and the reprojector.
//!
//! # Canonical ROI grid
//!
//! Every tile of a run is resampled onto the same pixel-center grid, derived
//! once from the ROI's projected bounding box:
//!
//! ```text
//!   min_x                                  max_x
//!   ┌──────┬──────┬──────┬─── ··· ───┬──────┐ max_y
//!   │  ×   │  ×   │  ×   │           │  ×   │   y[0] = max_y - ph/2
//!   ├──────┼──────┼──────┼─── ··· ───┼──────┤
//!   │  ×   │  ×   │  ×   │           │  ×   │   y[1] = max_y - 3ph/2
//!   └──────┴──────┴──────┴─── ··· ───┴──────┘
//!     x[0] = min_x + pw/2          width = floor((max_x - min_x) / pw)
//! ```

pub mod projection;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use projection::{project_point, CrsTransformer, ProjectionError};

// =============================================================================
// Coordinate reference systems
// =============================================================================

/// An EPSG coordinate reference system, displayed as `EPSG:<code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs(u16);

impl Crs {
    /// WGS84 longitude/latitude.
    pub const WGS84: Crs = Crs(4326);

    pub const fn new(epsg: u16) -> Self {
        Self(epsg)
    }

    /// WGS84 / UTM zone, northern (`326zz`) or southern (`327zz`) hemisphere.
    pub fn utm(zone: u8, north: bool) -> Self {
        let base = if north { 32600 } else { 32700 };
        Self(base + u16::from(zone.clamp(1, 60)))
    }

    pub fn epsg(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s
            .trim()
            .strip_prefix("EPSG:")
            .or_else(|| s.trim().strip_prefix("epsg:"))
            .unwrap_or(s.trim());
        code.parse::<u16>()
            .map(Crs)
            .map_err(|_| format!("invalid CRS identifier '{}'", s))
    }
}

impl TryFrom<String> for Crs {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

// =============================================================================
// Bounding boxes and pixel sizes
// =============================================================================

/// Axis-aligned bounding box in some coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box covering all points. Returns `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => BoundingBox::new(x, y, x, y),
                Some(b) => BoundingBox::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            })
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Number of whole pixels covering the box, `floor(extent / size)` per axis.
    pub fn pixel_dimensions(&self, pixel: PixelSize) -> (usize, usize) {
        let cols = (self.width() / pixel.x).floor().max(0.0) as usize;
        let rows = (self.height() / pixel.y).floor().max(0.0) as usize;
        (cols, rows)
    }
}

/// Pixel size in CRS units. Both components are positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
}

impl PixelSize {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// =============================================================================
// Ring helpers
// =============================================================================

/// UTM coordinate system covering the center of a WGS84 ring.
///
/// The center is the midpoint of the ring's bounding box, so the result does
/// not depend on vertex order. Zone is `floor((lon + 180) / 6) + 1`, clamped
/// to 1..=60; the hemisphere follows the sign of the center latitude.
pub fn utm_code_for(ring: &[[f64; 2]]) -> Option<Crs> {
    let bounds = BoundingBox::from_points(ring.iter().map(|p| (p[0], p[1])))?;
    let (lon, lat) = bounds.center();
    let zone = ((lon + 180.0) / 6.0).floor() as i64 + 1;
    Some(Crs::utm(zone.clamp(1, 60) as u8, lat >= 0.0))
}

/// Bounding box of a WGS84 ring once projected into `target`.
pub fn projected_bounds(ring: &[[f64; 2]], target: Crs) -> Result<BoundingBox, ProjectionError> {
    let transformer = CrsTransformer::new(Crs::WGS84, target)?;
    let points = ring
        .iter()
        .map(|p| transformer.transform(p[0], p[1]))
        .collect::<Result<Vec<_>, _>>()?;
    // Empty rings are rejected by the ROI model; fall back to a degenerate box.
    Ok(BoundingBox::from_points(points).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0)))
}

/// Ordered pixel-center coordinates of a grid.
///
/// `x` ascends left to right, `y` descends top to bottom.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PixelGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl PixelGrid {
    /// Grid of pixel centers covering `bounds` with the given pixel size.
    pub fn covering(bounds: &BoundingBox, pixel: PixelSize) -> Self {
        let (cols, rows) = bounds.pixel_dimensions(pixel);
        let x = (0..cols)
            .map(|i| bounds.min_x + pixel.x * (i as f64 + 0.5))
            .collect();
        let y = (0..rows)
            .map(|j| bounds.max_y - pixel.y * (j as f64 + 0.5))
            .collect();
        Self { x, y }
    }

    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    /// Whether two grids share coordinates within `tolerance`.
    pub fn matches(&self, other: &PixelGrid, tolerance: f64) -> bool {
        fn axis_matches(a: &[f64], b: &[f64], tolerance: f64) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(p, q)| (p - q).abs() <= tolerance)
        }
        axis_matches(&self.x, &other.x, tolerance) && axis_matches(&self.y, &other.y, tolerance)
    }
}

/// Canonical pixel-center grid of a WGS84 ring projected into `crs`.
pub fn pixel_center_grid(
    ring: &[[f64; 2]],
    crs: Crs,
    pixel: PixelSize,
) -> Result<PixelGrid, ProjectionError> {
    let bounds = projected_bounds(ring, crs)?;
    Ok(PixelGrid::covering(&bounds, pixel))
}
