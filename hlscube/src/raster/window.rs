//! ROI window math inside a source raster.
//!
//! The ROI window is positioned in the source raster's pixel space and may
//! hang over any edge. Only the overlapping part is read; it is copied into
//! a buffer the size of the full window at the offset where it belongs:
//!
//! ```text
//!            col_off < 0
//!          ┌───────────────────┐  ROI window (output buffer, nodata filled)
//!          │ nodata  ┌─────────┼──────────────┐
//!          │         │ copied  │              │ source raster
//!          └─────────┼─────────┘              │
//!                    │                        │
//!                    └────────────────────────┘
//! ```

use ndarray::{s, Array2};

use crate::geometry::{BoundingBox, PixelSize};

use super::affine::Affine;
use super::Sample;

/// ROI window in source pixel space. Offsets may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiWindow {
    pub col_off: i64,
    pub row_off: i64,
    pub width: usize,
    pub height: usize,
}

/// Overlap between an ROI window and the source raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWindow {
    /// First source column and row to read.
    pub src_col: usize,
    pub src_row: usize,
    /// Number of columns and rows to read.
    pub width: usize,
    pub height: usize,
    /// Where the read lands in the output buffer.
    pub dst_col: usize,
    pub dst_row: usize,
}

impl RoiWindow {
    /// Window covering `bounds` in a raster with transform `transform`.
    ///
    /// The size is `floor(extent / pixel)` per axis and the offsets are the
    /// floored pixel position of the upper-left corner. Returns `None` for a
    /// singular transform.
    pub fn locate(bounds: &BoundingBox, transform: &Affine, pixel: PixelSize) -> Option<Self> {
        let inverse = transform.inverse()?;
        let (col, row) = inverse.apply(bounds.min_x, bounds.max_y);
        let (width, height) = bounds.pixel_dimensions(pixel);
        Some(Self {
            col_off: col.floor() as i64,
            row_off: row.floor() as i64,
            width,
            height,
        })
    }

    /// Clips the window to a `raster_width` × `raster_height` raster.
    ///
    /// Returns `None` when the window does not overlap the raster at all.
    pub fn clip(&self, raster_width: usize, raster_height: usize) -> Option<ReadWindow> {
        let (src_col, dst_col, width) = clip_axis(self.col_off, self.width, raster_width)?;
        let (src_row, dst_row, height) = clip_axis(self.row_off, self.height, raster_height)?;
        Some(ReadWindow {
            src_col,
            src_row,
            width,
            height,
            dst_col,
            dst_row,
        })
    }
}

fn clip_axis(offset: i64, size: usize, limit: usize) -> Option<(usize, usize, usize)> {
    let start = offset.max(0);
    let end = (offset + size as i64).min(limit as i64);
    if end <= start {
        return None;
    }
    Some((start as usize, (start - offset) as usize, (end - start) as usize))
}

/// Extracts `window` from a row-major source band into a nodata-padded buffer.
///
/// `read` returns the source value at a flat index. The output always has
/// shape `(window.height, window.width)`.
pub fn extract_window<T, F>(
    window: &RoiWindow,
    raster_width: usize,
    raster_height: usize,
    nodata: f64,
    read: F,
) -> Array2<T>
where
    T: Sample,
    F: Fn(usize) -> f64,
{
    let mut out = Array2::from_elem((window.height, window.width), T::from_f64(nodata));
    let Some(read_window) = window.clip(raster_width, raster_height) else {
        return out;
    };

    let mut target = out.slice_mut(s![
        read_window.dst_row..read_window.dst_row + read_window.height,
        read_window.dst_col..read_window.dst_col + read_window.width
    ]);
    for ((r, c), value) in target.indexed_iter_mut() {
        let idx = (read_window.src_row + r) * raster_width + read_window.src_col + c;
        *value = T::from_f64(read(idx));
    }
    out
}
