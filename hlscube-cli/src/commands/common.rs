//! Common helpers shared across CLI commands.

use std::path::Path;

use hlscube::{ConfigFile, RoiPolygon, SceneRecord};
use serde_json::Value;

use crate::error::CliError;

/// Loads `explicit` if given, else the default config file if present.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile, CliError> {
    match explicit {
        Some(path) => Ok(ConfigFile::load(path)?),
        None => match ConfigFile::default_path() {
            Some(path) => Ok(ConfigFile::load_or_default(&path)?),
            None => Ok(ConfigFile::default()),
        },
    }
}

/// Reads a JSON file into a value.
pub fn read_json(path: &Path) -> Result<Value, CliError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads an ROI from a GeoJSON geometry or Feature file.
///
/// The ROI id is the file stem.
pub fn read_roi(path: &Path, max_area_km2: f64) -> Result<RoiPolygon, CliError> {
    let value = read_json(path)?;
    let geometry = match value.get("type").and_then(Value::as_str) {
        Some("Feature") => value.get("geometry").cloned().unwrap_or(Value::Null),
        _ => value,
    };
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "roi".to_string());
    Ok(RoiPolygon::from_geojson(id, &geometry, max_area_km2)?)
}

/// Reads a JSON array of scene records.
pub fn read_records(path: &Path) -> Result<Vec<SceneRecord>, CliError> {
    let value = read_json(path)?;
    serde_json::from_value(value).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}
