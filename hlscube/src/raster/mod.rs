//! In-memory rasters: decoded GeoTIFFs, ROI windows and per-band tiles.

pub mod affine;
pub mod geotiff;
pub mod window;

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, Axis};

use crate::band::{Band, SatelliteId, StorageType};
use crate::geometry::{Crs, PixelGrid, PixelSize};

pub use affine::Affine;
pub use geotiff::{GeoTiff, RasterError};
pub use window::{extract_window, ReadWindow, RoiWindow};

/// Pixel types a band can be stored as.
pub trait Sample: Copy + Send + Sync + 'static {
    /// Casts with rounding and saturation. NaN maps to zero.
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl Sample for u8 {
    fn from_f64(value: f64) -> Self {
        value.round() as u8
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Sample for i16 {
    fn from_f64(value: f64) -> Self {
        value.round() as i16
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

/// A `(time, y, x)` pixel cube in one of the band storage types.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelArray {
    UInt8(Array3<u8>),
    Int16(Array3<i16>),
}

impl PixelArray {
    /// Cube of shape `(time, height, width)` filled with `value`.
    pub fn filled(storage: StorageType, shape: (usize, usize, usize), value: f64) -> Self {
        match storage {
            StorageType::UInt8 => PixelArray::UInt8(Array3::from_elem(shape, u8::from_f64(value))),
            StorageType::Int16 => PixelArray::Int16(Array3::from_elem(shape, i16::from_f64(value))),
        }
    }

    /// Single time-step cube from a 2-D plane of arbitrary values.
    pub fn from_plane(storage: StorageType, plane: &Array2<f64>) -> Self {
        match storage {
            StorageType::UInt8 => PixelArray::UInt8(plane.mapv(u8::from_f64).insert_axis(Axis(0))),
            StorageType::Int16 => PixelArray::Int16(plane.mapv(i16::from_f64).insert_axis(Axis(0))),
        }
    }

    pub fn storage(&self) -> StorageType {
        match self {
            PixelArray::UInt8(_) => StorageType::UInt8,
            PixelArray::Int16(_) => StorageType::Int16,
        }
    }

    /// `(time, height, width)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            PixelArray::UInt8(a) => a.dim(),
            PixelArray::Int16(a) => a.dim(),
        }
    }

    /// Value at `(t, y, x)` widened to `f64`.
    pub fn get(&self, t: usize, y: usize, x: usize) -> Option<f64> {
        match self {
            PixelArray::UInt8(a) => a.get((t, y, x)).map(|v| v.to_f64()),
            PixelArray::Int16(a) => a.get((t, y, x)).map(|v| v.to_f64()),
        }
    }

    /// Time step `t` widened to `f64`.
    pub fn plane(&self, t: usize) -> Array2<f64> {
        match self {
            PixelArray::UInt8(a) => a.index_axis(Axis(0), t).mapv(Sample::to_f64),
            PixelArray::Int16(a) => a.index_axis(Axis(0), t).mapv(Sample::to_f64),
        }
    }

    /// Re-encodes into `storage`, casting every value.
    pub fn cast(self, storage: StorageType) -> Self {
        match (self, storage) {
            (a @ PixelArray::UInt8(_), StorageType::UInt8) => a,
            (a @ PixelArray::Int16(_), StorageType::Int16) => a,
            (PixelArray::UInt8(a), StorageType::Int16) => PixelArray::Int16(a.mapv(|v| v.into())),
            (PixelArray::Int16(a), StorageType::UInt8) => {
                PixelArray::UInt8(a.mapv(|v| u8::from_f64(v.to_f64())))
            }
        }
    }

    /// Copies time step `src_t` of `src` into time step `dst_t` of `self`.
    ///
    /// Both cubes must share `(height, width)`; values are cast to `self`'s
    /// storage type.
    pub fn assign_plane(&mut self, dst_t: usize, src: &PixelArray, src_t: usize) {
        let plane = src.plane(src_t);
        match self {
            PixelArray::UInt8(a) => a
                .index_axis_mut(Axis(0), dst_t)
                .assign(&plane.mapv(u8::from_f64)),
            PixelArray::Int16(a) => a
                .index_axis_mut(Axis(0), dst_t)
                .assign(&plane.mapv(i16::from_f64)),
        }
    }
}

/// One band of one scene, clipped to the ROI window.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    pub band: Band,
    pub satellite: SatelliteId,
    pub tile_id: String,
    pub time: DateTime<Utc>,
    pub crs: Crs,
    pub pixel_size: PixelSize,
    /// Pixel-center coordinates of the `(y, x)` axes.
    pub grid: PixelGrid,
    /// Shape `(1, grid.height(), grid.width())`.
    pub data: PixelArray,
}

impl RasterTile {
    pub fn nodata(&self) -> f64 {
        self.band.nodata()
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }
}
