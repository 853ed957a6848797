//! Reprojection of a tile onto the ROI's canonical grid.
//!
//! Tiles whose native UTM zone differs from the ROI's zone go through two
//! resampling passes:
//!
//! ```text
//!  native grid ──[bilinear warp]──► default grid in target CRS
//!                                         │
//!                                  [nearest snap]
//!                                         ▼
//!                                canonical ROI grid
//! ```
//!
//! The warp honours the band's nodata value on both sides so missing pixels
//! never bleed into valid ones. The snap exists because the default grid's
//! origin is wherever the warped extent happens to start; every tile of a run
//! has to land on identical coordinates for the merge to line up.

use ndarray::Array2;
use tracing::debug;

use crate::geometry::{BoundingBox, Crs, CrsTransformer, PixelGrid, PixelSize, ProjectionError};
use crate::raster::{Affine, PixelArray, RasterTile};
use crate::roi::RoiPolygon;

/// Points sampled along each edge when estimating the warped extent.
const EDGE_SAMPLES: usize = 21;

/// Slack when turning an extent into a pixel count.
const EXTENT_EPSILON: f64 = 1e-6;

/// Destination grid of a default reprojection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpGrid {
    pub transform: Affine,
    pub width: usize,
    pub height: usize,
}

impl WarpGrid {
    /// Pixel-center coordinates of this grid.
    pub fn centers(&self) -> PixelGrid {
        let x = (0..self.width)
            .map(|i| self.transform.apply(i as f64 + 0.5, 0.0).0)
            .collect();
        let y = (0..self.height)
            .map(|j| self.transform.apply(0.0, j as f64 + 0.5).1)
            .collect();
        PixelGrid { x, y }
    }
}

/// Reprojects tiles into one target CRS at a fixed pixel size.
#[derive(Debug, Clone, Copy)]
pub struct Reprojector {
    target: Crs,
    pixel: PixelSize,
}

impl Reprojector {
    pub fn new(target: Crs, pixel: PixelSize) -> Self {
        Self { target, pixel }
    }

    /// Resamples `tile` onto the ROI's canonical grid in the target CRS.
    pub fn reproject(&self, tile: &RasterTile, roi: &RoiPolygon) -> Result<RasterTile, ProjectionError> {
        let nodata = tile.nodata();
        let storage = tile.band.storage().storage;
        let roi_grid = roi.grid_in(self.target, self.pixel)?;

        let Some(src_transform) = source_transform(&tile.grid, tile.pixel_size) else {
            debug!(band = %tile.band, tile_id = %tile.tile_id, "Empty source tile, filling with nodata");
            let plane = Array2::from_elem((roi_grid.height(), roi_grid.width()), nodata);
            return Ok(self.retag(tile, roi_grid, PixelArray::from_plane(storage, &plane)));
        };

        let src_plane = tile.data.plane(0);
        let warp = default_grid(
            tile.crs,
            self.target,
            &src_transform,
            src_plane.ncols(),
            src_plane.nrows(),
            self.pixel,
        )?;
        let warped = warp_bilinear(&src_plane, &src_transform, tile.crs, &warp, self.target, nodata)?;
        let snapped = snap_nearest(&warped, &warp.centers(), &roi_grid, self.pixel, nodata);

        debug!(
            band = %tile.band,
            tile_id = %tile.tile_id,
            source_crs = %tile.crs,
            target_crs = %self.target,
            warp_width = warp.width,
            warp_height = warp.height,
            "Reprojected tile"
        );

        Ok(self.retag(tile, roi_grid, PixelArray::from_plane(storage, &snapped)))
    }

    fn retag(&self, tile: &RasterTile, grid: PixelGrid, data: PixelArray) -> RasterTile {
        RasterTile {
            band: tile.band,
            satellite: tile.satellite,
            tile_id: tile.tile_id.clone(),
            time: tile.time,
            crs: self.target,
            pixel_size: self.pixel,
            grid,
            data,
        }
    }
}

/// North-up transform reconstructed from pixel-center coordinates.
fn source_transform(grid: &PixelGrid, pixel: PixelSize) -> Option<Affine> {
    let min_x = grid.x.iter().copied().reduce(f64::min)?;
    let max_y = grid.y.iter().copied().reduce(f64::max)?;
    Some(Affine::from_origin(
        min_x - pixel.x / 2.0,
        max_y + pixel.y / 2.0,
        pixel.x,
        pixel.y,
    ))
}

/// Grid covering the reprojected source extent.
///
/// The source outline is densified, transformed and bounded; the result is
/// a north-up grid at `pixel` resolution anchored at the bounds' upper-left.
/// Unlike GDAL's suggested warp output, which rounds `extent / pixel + 0.5`,
/// each axis is sized `ceil(extent / pixel)` so the grid always covers the
/// outline. The extra column or row is dropped by [`snap_nearest`] onto the
/// ROI grid.
pub fn default_grid(
    source: Crs,
    target: Crs,
    src_transform: &Affine,
    src_width: usize,
    src_height: usize,
    pixel: PixelSize,
) -> Result<WarpGrid, ProjectionError> {
    let transformer = CrsTransformer::new(source, target)?;
    let (w, h) = (src_width as f64, src_height as f64);

    let mut outline = Vec::with_capacity(EDGE_SAMPLES * 4);
    for k in 0..EDGE_SAMPLES {
        let t = k as f64 / (EDGE_SAMPLES - 1) as f64;
        outline.push((t * w, 0.0));
        outline.push((t * w, h));
        outline.push((0.0, t * h));
        outline.push((w, t * h));
    }

    let projected = outline
        .into_iter()
        .map(|(col, row)| {
            let (x, y) = src_transform.apply(col, row);
            transformer.transform(x, y)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let bounds = BoundingBox::from_points(projected).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0));

    let width = ((bounds.width() / pixel.x - EXTENT_EPSILON).ceil().max(1.0)) as usize;
    let height = ((bounds.height() / pixel.y - EXTENT_EPSILON).ceil().max(1.0)) as usize;
    Ok(WarpGrid {
        transform: Affine::from_origin(bounds.min_x, bounds.max_y, pixel.x, pixel.y),
        width,
        height,
    })
}

/// Bilinear warp of `src` into `dst`, treating `nodata` as missing.
///
/// Each destination pixel center is mapped back into the source grid. The
/// four surrounding source centers are blended; neighbours that are outside
/// the raster or equal to `nodata` are left out and the remaining weights
/// renormalised. Pixels with no valid neighbour, or that fall outside the
/// source extent, get `nodata`.
pub fn warp_bilinear(
    src: &Array2<f64>,
    src_transform: &Affine,
    source: Crs,
    dst: &WarpGrid,
    target: Crs,
    nodata: f64,
) -> Result<Array2<f64>, ProjectionError> {
    let inverse = CrsTransformer::new(target, source)?;
    let (src_h, src_w) = src.dim();
    let mut out = Array2::from_elem((dst.height, dst.width), nodata);
    let Some(to_pixel) = src_transform.inverse() else {
        return Ok(out);
    };

    for ((row, col), value) in out.indexed_iter_mut() {
        let (x, y) = dst.transform.apply(col as f64 + 0.5, row as f64 + 0.5);
        let Ok((sx, sy)) = inverse.transform(x, y) else {
            continue;
        };
        let (fc, fr) = to_pixel.apply(sx, sy);
        if !(0.0..=src_w as f64).contains(&fc) || !(0.0..=src_h as f64).contains(&fr) {
            continue;
        }
        if let Some(v) = sample_bilinear(src, fc - 0.5, fr - 0.5, nodata) {
            *value = v;
        }
    }
    Ok(out)
}

fn sample_bilinear(src: &Array2<f64>, u: f64, v: f64, nodata: f64) -> Option<f64> {
    let (h, w) = src.dim();
    let c0 = u.floor();
    let r0 = v.floor();
    let fu = u - c0;
    let fv = v - r0;

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (dc, dr, wgt) in [
        (0, 0, (1.0 - fu) * (1.0 - fv)),
        (1, 0, fu * (1.0 - fv)),
        (0, 1, (1.0 - fu) * fv),
        (1, 1, fu * fv),
    ] {
        let c = c0 as i64 + dc;
        let r = r0 as i64 + dr;
        if wgt <= 0.0 || c < 0 || r < 0 || c >= w as i64 || r >= h as i64 {
            continue;
        }
        let sample = src[[r as usize, c as usize]];
        if sample == nodata || sample.is_nan() {
            continue;
        }
        sum += sample * wgt;
        weight += wgt;
    }
    (weight > 0.0).then(|| sum / weight)
}

/// Nearest-neighbour resample of `src` (on `src_grid`) onto `dst_grid`.
///
/// A destination center further than half a pixel outside the source grid
/// gets `nodata`.
pub fn snap_nearest(
    src: &Array2<f64>,
    src_grid: &PixelGrid,
    dst_grid: &PixelGrid,
    pixel: PixelSize,
    nodata: f64,
) -> Array2<f64> {
    let cols: Vec<Option<usize>> = dst_grid
        .x
        .iter()
        .map(|x| nearest_index(&src_grid.x, *x, pixel.x))
        .collect();
    let rows: Vec<Option<usize>> = dst_grid
        .y
        .iter()
        .map(|y| nearest_index(&src_grid.y, *y, pixel.y))
        .collect();

    Array2::from_shape_fn((dst_grid.height(), dst_grid.width()), |(r, c)| {
        match (rows[r], cols[c]) {
            (Some(sr), Some(sc)) => src.get((sr, sc)).copied().unwrap_or(nodata),
            _ => nodata,
        }
    })
}

/// Index of the regularly spaced coordinate nearest to `value`.
///
/// `axis` may ascend or descend; `spacing` is the positive step.
fn nearest_index(axis: &[f64], value: f64, spacing: f64) -> Option<usize> {
    let first = *axis.first()?;
    let step = if axis.len() > 1 && axis[1] < first {
        -spacing
    } else {
        spacing
    };
    let idx = ((value - first) / step).round();
    if idx < 0.0 || idx >= axis.len() as f64 {
        return None;
    }
    let idx = idx as usize;
    ((axis[idx] - value).abs() <= spacing / 2.0 + EXTENT_EPSILON).then_some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::{Band, SatelliteId, StorageType};
    use chrono::TimeZone;
    use ndarray::Array3;
    use serde_json::json;

    fn roi_at(lon: f64, lat: f64, size: f64) -> RoiPolygon {
        RoiPolygon::from_geojson(
            "test",
            &json!({
                "type": "Polygon",
                "coordinates": [[[lon, lat], [lon + size, lat], [lon + size, lat + size], [lon, lat + size], [lon, lat]]]
            }),
            500.0,
        )
        .unwrap()
    }

    fn tile_on_grid(roi: &RoiPolygon, crs: Crs, band: Band) -> RasterTile {
        let pixel = PixelSize::new(30.0, 30.0);
        let grid = roi.grid_in(crs, pixel).unwrap();
        let (h, w) = (grid.height(), grid.width());
        let data = Array3::from_shape_fn((1, h, w), |(_, r, c)| ((r * 7 + c * 3) % 1000) as i16);
        RasterTile {
            band,
            satellite: SatelliteId::S30,
            tile_id: "T33UUP".to_string(),
            time: chrono::Utc.with_ymd_and_hms(2023, 5, 3, 10, 15, 59).unwrap(),
            crs,
            pixel_size: pixel,
            grid,
            data: PixelArray::Int16(data),
        }
    }

    #[test]
    fn test_same_crs_is_identity() {
        let roi = roi_at(15.0, 52.0, 0.02);
        let tile = tile_on_grid(&roi, roi.crs(), Band::Red);

        let out = Reprojector::new(roi.crs(), tile.pixel_size)
            .reproject(&tile, &roi)
            .unwrap();

        assert_eq!(out.crs, roi.crs());
        assert!(out.grid.matches(&tile.grid, 1e-6));
        assert_eq!(out.data, tile.data);
    }

    #[test]
    fn test_cross_zone_lands_on_roi_grid() {
        // ROI centred in zone 33, tile delivered in zone 32.
        let roi = roi_at(12.1, 52.0, 0.02);
        assert_eq!(roi.crs(), Crs::new(32633));
        let tile = tile_on_grid(&roi, Crs::new(32632), Band::Nir);

        let out = Reprojector::new(roi.crs(), tile.pixel_size)
            .reproject(&tile, &roi)
            .unwrap();

        let expected = roi.grid_in(roi.crs(), tile.pixel_size).unwrap();
        assert_eq!(out.crs, Crs::new(32633));
        assert_eq!(out.grid, expected);
        assert_eq!(out.data.dim(), (1, expected.height(), expected.width()));
        assert_eq!(out.satellite, tile.satellite);
        assert_eq!(out.tile_id, tile.tile_id);
        assert_eq!(out.time, tile.time);

        // The interior is covered by the source and must hold real values.
        let (_, h, w) = out.data.dim();
        assert_ne!(out.data.get(0, h / 2, w / 2), Some(-9999.0));
    }

    #[test]
    fn test_mask_band_keeps_uint8() {
        let roi = roi_at(12.1, 52.0, 0.01);
        let mut tile = tile_on_grid(&roi, Crs::new(32632), Band::Fmask);
        tile.data = tile.data.cast(StorageType::UInt8);

        let out = Reprojector::new(roi.crs(), tile.pixel_size)
            .reproject(&tile, &roi)
            .unwrap();
        assert!(matches!(out.data, PixelArray::UInt8(_)));
    }

    #[test]
    fn test_bilinear_skips_nodata_neighbours() {
        let src = ndarray::arr2(&[[10.0, -9999.0], [30.0, 40.0]]);
        // Exactly between all four centers.
        let v = sample_bilinear(&src, 0.5, 0.5, -9999.0).unwrap();
        assert!((v - (10.0 + 30.0 + 40.0) / 3.0).abs() < 1e-9);
        // On a center.
        assert_eq!(sample_bilinear(&src, 1.0, 1.0, -9999.0), Some(40.0));
        // Only nodata around.
        let empty = ndarray::arr2(&[[-9999.0]]);
        assert_eq!(sample_bilinear(&empty, 0.0, 0.0, -9999.0), None);
    }

    #[test]
    fn test_warp_outside_source_is_nodata() {
        let src = Array2::from_elem((2, 2), 5.0);
        let src_transform = Affine::from_origin(0.0, 60.0, 30.0, 30.0);
        let dst = WarpGrid {
            transform: Affine::from_origin(0.0, 120.0, 30.0, 30.0),
            width: 2,
            height: 4,
        };
        let crs = Crs::new(32633);
        let out = warp_bilinear(&src, &src_transform, crs, &dst, crs, -9999.0).unwrap();
        assert_eq!(out.row(0).to_vec(), vec![-9999.0, -9999.0]);
        assert_eq!(out.row(2).to_vec(), vec![5.0, 5.0]);
    }

    #[test]
    fn test_default_grid_same_crs_preserves_extent() {
        let t = Affine::from_origin(300_000.0, 5_800_000.0, 30.0, 30.0);
        let crs = Crs::new(32633);
        let grid = default_grid(crs, crs, &t, 10, 7, PixelSize::new(30.0, 30.0)).unwrap();
        assert_eq!((grid.width, grid.height), (10, 7));
        assert_eq!(grid.transform, t);
    }

    #[test]
    fn test_default_grid_rounds_partial_pixels_up() {
        // 300 x 210 m at 50 m: 6 columns exactly, 4.2 rows -> 5
        let t = Affine::from_origin(300_000.0, 5_800_000.0, 30.0, 30.0);
        let crs = Crs::new(32633);
        let grid = default_grid(crs, crs, &t, 10, 7, PixelSize::new(50.0, 50.0)).unwrap();
        assert_eq!((grid.width, grid.height), (6, 5));
    }

    #[test]
    fn test_snap_nearest_shifts_less_than_a_pixel() {
        let src = ndarray::arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let src_grid = PixelGrid {
            x: vec![15.0, 45.0, 75.0],
            y: vec![45.0, 15.0],
        };
        let dst_grid = PixelGrid {
            x: vec![20.0, 50.0, 80.0, 140.0],
            y: vec![40.0, 10.0],
        };
        let out = snap_nearest(&src, &src_grid, &dst_grid, PixelSize::new(30.0, 30.0), -1.0);
        assert_eq!(out, ndarray::arr2(&[[1.0, 2.0, 3.0, -1.0], [4.0, 5.0, 6.0, -1.0]]));
    }

    #[test]
    fn test_nearest_index_directions() {
        assert_eq!(nearest_index(&[15.0, 45.0], 44.0, 30.0), Some(1));
        assert_eq!(nearest_index(&[45.0, 15.0], 44.0, 30.0), Some(0));
        assert_eq!(nearest_index(&[15.0, 45.0], -20.0, 30.0), None);
        assert_eq!(nearest_index(&[], 0.0, 30.0), None);
    }
}
