//! `hlscube roi`: inspect the grid an ROI resolves to.

use std::path::Path;

use hlscube::{ConfigFile, PixelSize};

use super::common::read_roi;
use crate::error::CliError;

/// HLS reflectance resolution used for the grid preview.
const PREVIEW_PIXEL_M: f64 = 30.0;

pub fn run(path: &Path, config: &ConfigFile) -> Result<(), CliError> {
    let roi = read_roi(path, config.pipeline.max_area_km2)?;
    let crs = roi.crs();
    let bounds = roi.bounds_in(crs).map_err(hlscube::RoiError::from)?;
    let (cols, rows) = bounds.pixel_dimensions(PixelSize::new(PREVIEW_PIXEL_M, PREVIEW_PIXEL_M));

    println!("ROI:      {}", roi.id());
    println!("CRS:      {}", crs);
    println!(
        "Area:     {:.2} km² (limit {} km²)",
        roi.area_km2(),
        roi.max_area_km2()
    );
    println!(
        "Bounds:   {:.1} {:.1} {:.1} {:.1}",
        bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
    );
    println!("Grid:     {} x {} pixels at {} m", cols, rows, PREVIEW_PIXEL_M);
    Ok(())
}
