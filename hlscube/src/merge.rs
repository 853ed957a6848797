//! Merge of per-band tiles into one time-indexed cube.
//!
//! ```text
//! tiles ──group by (satellite, tile id)──► per-group cubes
//!                                           │  one time axis per group,
//!                                           │  one array per band
//!                                           ▼
//!                       concatenate along time, stable sort by time
//!                                           │
//!                                           ▼
//!                                     MergedDataset
//! ```
//!
//! Every tile of a run is already on the ROI grid, so groups only differ
//! along the time axis. A (band, time) slot that no tile filled is left at
//! the band's nodata value.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::band::{Band, SatelliteId};
use crate::geometry::{Crs, PixelGrid, PixelSize};
use crate::raster::{PixelArray, RasterTile};
use crate::scene::SceneRecord;

/// Coordinate tolerance when comparing tile grids, in CRS units.
pub const DEFAULT_GRID_TOLERANCE: f64 = 1e-6;

/// Tiles that cannot be placed in one cube.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("no tiles to merge")]
    Empty,

    #[error("tile {tile_id} band {band} is in {found}, expected {expected}")]
    CrsMismatch {
        tile_id: String,
        band: Band,
        expected: Crs,
        found: Crs,
    },

    #[error(
        "tile {tile_id} band {band} does not share the dataset grid \
         ({found_width}x{found_height}, expected {expected_width}x{expected_height})"
    )]
    GridMismatch {
        tile_id: String,
        band: Band,
        expected_width: usize,
        expected_height: usize,
        found_width: usize,
        found_height: usize,
    },

    #[error("duplicate {band} tile at {time} for {satellite} {tile_id}")]
    DuplicateSlot {
        satellite: SatelliteId,
        tile_id: String,
        band: Band,
        time: DateTime<Utc>,
    },
}

/// Multi-band, time-indexed raster cube.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    /// Acquisition times, ascending.
    pub time: Vec<DateTime<Utc>>,
    /// Shared pixel-center grid.
    pub grid: PixelGrid,
    pub crs: Crs,
    pub pixel_size: PixelSize,
    /// One `(time, y, x)` cube per band, in the band's storage type.
    pub bands: BTreeMap<Band, PixelArray>,
    /// Per-time-step satellite discriminator, present when the run mixes
    /// sensor families.
    pub satellite: Option<Vec<u8>>,
    pub attrs: BTreeMap<String, String>,
}

impl MergedDataset {
    pub fn time_steps(&self) -> usize {
        self.time.len()
    }

    /// `(time, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.time.len(), self.grid.height(), self.grid.width())
    }

    pub fn band(&self, band: Band) -> Option<&PixelArray> {
        self.bands.get(&band)
    }
}

/// Per-(satellite, tile) cube before concatenation.
struct GroupCube {
    satellite: SatelliteId,
    times: Vec<DateTime<Utc>>,
    bands: BTreeMap<Band, PixelArray>,
}

/// Groups, aligns and concatenates tiles.
#[derive(Debug, Clone)]
pub struct DatasetMerger {
    grid_tolerance: f64,
}

impl Default for DatasetMerger {
    fn default() -> Self {
        Self {
            grid_tolerance: DEFAULT_GRID_TOLERANCE,
        }
    }
}

impl DatasetMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grid_tolerance(mut self, tolerance: f64) -> Self {
        self.grid_tolerance = tolerance;
        self
    }

    /// Merges `tiles` into one cube.
    ///
    /// `records` is the run's record set; it fixes the group order and tells
    /// whether more than one satellite family took part.
    pub fn merge(&self, tiles: Vec<RasterTile>, records: &[SceneRecord]) -> Result<MergedDataset, MergeError> {
        let Some(first) = tiles.first() else {
            return Err(MergeError::Empty);
        };
        let grid = first.grid.clone();
        let crs = first.crs;
        let pixel_size = first.pixel_size;
        for tile in &tiles {
            self.check_alignment(tile, &grid, crs)?;
        }

        let satellites: BTreeSet<SatelliteId> = records
            .iter()
            .map(|r| r.satellite)
            .chain(tiles.iter().map(|t| t.satellite))
            .collect();
        let multi_satellite = satellites.len() > 1;
        let all_bands: BTreeSet<Band> = tiles.iter().map(|t| t.band).collect();
        let (height, width) = (grid.height(), grid.width());

        let cubes = group_tiles(tiles, records)
            .into_iter()
            .map(|((satellite, tile_id), group)| build_group(satellite, &tile_id, group, &all_bands, height, width))
            .collect::<Result<Vec<_>, _>>()?;

        // (time, group, index within group), stable-sorted by time.
        let mut order: Vec<(DateTime<Utc>, usize, usize)> = cubes
            .iter()
            .enumerate()
            .flat_map(|(g, cube)| cube.times.iter().enumerate().map(move |(i, t)| (*t, g, i)))
            .collect();
        order.sort_by_key(|(time, _, _)| *time);

        let steps = order.len();
        let mut bands = BTreeMap::new();
        for band in &all_bands {
            let policy = band.storage();
            let mut out = PixelArray::filled(policy.storage, (steps, height, width), policy.nodata);
            for (dst, (_, g, i)) in order.iter().enumerate() {
                if let Some(src) = cubes[*g].bands.get(band) {
                    out.assign_plane(dst, src, *i);
                }
            }
            bands.insert(*band, out);
        }

        let satellite = multi_satellite.then(|| {
            order
                .iter()
                .map(|(_, g, _)| cubes[*g].satellite.discriminator())
                .collect()
        });

        let mut attrs = BTreeMap::new();
        attrs.insert("crs".to_string(), crs.to_string());
        attrs.insert(
            "pixel_size".to_string(),
            format!("{} {}", pixel_size.x, pixel_size.y),
        );
        if multi_satellite {
            let legend = SatelliteId::ALL
                .iter()
                .map(|s| format!("{} : {}", s, s.discriminator()))
                .collect::<Vec<_>>()
                .join(", ");
            attrs.insert("sat_ids".to_string(), legend);
        } else if let Some(only) = satellites.iter().next() {
            attrs.insert("satellite".to_string(), only.to_string());
        }

        info!(
            groups = cubes.len(),
            time_steps = steps,
            bands = bands.len(),
            height,
            width,
            crs = %crs,
            "Merged dataset"
        );

        Ok(MergedDataset {
            time: order.into_iter().map(|(t, _, _)| t).collect(),
            grid,
            crs,
            pixel_size,
            bands,
            satellite,
            attrs,
        })
    }

    fn check_alignment(&self, tile: &RasterTile, grid: &PixelGrid, crs: Crs) -> Result<(), MergeError> {
        if tile.crs != crs {
            return Err(MergeError::CrsMismatch {
                tile_id: tile.tile_id.clone(),
                band: tile.band,
                expected: crs,
                found: tile.crs,
            });
        }
        let (_, rows, cols) = tile.data.dim();
        let shape_ok = rows == grid.height() && cols == grid.width();
        if !shape_ok || !tile.grid.matches(grid, self.grid_tolerance) {
            return Err(MergeError::GridMismatch {
                tile_id: tile.tile_id.clone(),
                band: tile.band,
                expected_width: grid.width(),
                expected_height: grid.height(),
                found_width: cols,
                found_height: rows,
            });
        }
        Ok(())
    }
}

/// Groups tiles by (satellite, tile id).
///
/// Groups appear in the order their key first shows up in `records`; keys
/// without a record follow in tile order.
fn group_tiles(
    tiles: Vec<RasterTile>,
    records: &[SceneRecord],
) -> Vec<((SatelliteId, String), Vec<RasterTile>)> {
    let mut index: HashMap<(SatelliteId, String), usize> = HashMap::new();
    let mut groups: Vec<((SatelliteId, String), Vec<RasterTile>)> = Vec::new();

    let keys = records
        .iter()
        .map(|r| (r.satellite, r.tile_id.clone()))
        .chain(tiles.iter().map(|t| (t.satellite, t.tile_id.clone())))
        .collect::<Vec<_>>();
    for key in keys {
        if !index.contains_key(&key) {
            index.insert(key.clone(), groups.len());
            groups.push((key, Vec::new()));
        }
    }

    for tile in tiles {
        let key = (tile.satellite, tile.tile_id.clone());
        if let Some(&slot) = index.get(&key) {
            groups[slot].1.push(tile);
        }
    }

    // Records whose tiles all failed leave empty groups behind.
    groups.retain(|(_, group)| !group.is_empty());
    groups
}

fn build_group(
    satellite: SatelliteId,
    tile_id: &str,
    tiles: Vec<RasterTile>,
    all_bands: &BTreeSet<Band>,
    height: usize,
    width: usize,
) -> Result<GroupCube, MergeError> {
    let times: Vec<DateTime<Utc>> = tiles
        .iter()
        .map(|t| t.time)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let slot_of: HashMap<DateTime<Utc>, usize> = times.iter().enumerate().map(|(i, t)| (*t, i)).collect();

    let mut bands: BTreeMap<Band, PixelArray> = all_bands
        .iter()
        .map(|band| {
            let policy = band.storage();
            (
                *band,
                PixelArray::filled(policy.storage, (times.len(), height, width), policy.nodata),
            )
        })
        .collect();

    let mut filled: BTreeSet<(Band, usize)> = BTreeSet::new();
    for tile in &tiles {
        let slot = slot_of[&tile.time];
        if !filled.insert((tile.band, slot)) {
            return Err(MergeError::DuplicateSlot {
                satellite,
                tile_id: tile_id.to_string(),
                band: tile.band,
                time: tile.time,
            });
        }
        if let Some(cube) = bands.get_mut(&tile.band) {
            cube.assign_plane(slot, &tile.data, 0);
        }
    }

    let missing = all_bands.len() * times.len() - filled.len();
    if missing > 0 {
        debug!(satellite = %satellite, tile_id, missing, "Filling missing band slots with nodata");
    }

    Ok(GroupCube {
        satellite,
        times,
        bands,
    })
}
