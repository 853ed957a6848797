//! `hlscube scenes`: expand a granule id into per-band scene records.

use hlscube::scene::{expand_granule, parse_datetime};
use hlscube::{Band, ConfigFile};

use crate::error::CliError;

pub fn run(granule: &str, datetime: &str, bands: &[Band], config: &ConfigFile) -> Result<(), CliError> {
    parse_datetime(datetime).map_err(|e| {
        CliError::InvalidArgument(format!("invalid --datetime '{}': {}", datetime, e))
    })?;

    let bands = if bands.is_empty() { &Band::ALL[..] } else { bands };
    let records = expand_granule(granule, datetime, bands, &config.pipeline.band_catalog)?;

    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| CliError::InvalidArgument(format!("failed to serialize records: {}", e)))?;
    println!("{}", json);
    Ok(())
}
