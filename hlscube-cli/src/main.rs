//! hlscube CLI - Command-line interface
//!
//! Builds time-indexed HLS raster cubes for a GeoJSON region of interest.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hlscube::logging::init_logging;
use hlscube::Band;

use crate::commands::common::load_config;
use crate::commands::process::ProcessArgs;
use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "hlscube", version, about = "Windowed HLS raster cubes for a region of interest")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the UTM zone, area and pixel grid derived for an ROI
    Roi {
        /// GeoJSON Polygon (geometry or Feature)
        #[arg(long, value_name = "PATH")]
        roi: PathBuf,
    },

    /// Expand an HLS granule id into per-band scene records (JSON)
    Scenes {
        /// Granule id, e.g. HLS.S30.T33UUP.2023123T101559.v2.0
        #[arg(long)]
        granule: String,

        /// Acquisition time, e.g. 2023-05-03T10:15:59.024Z
        #[arg(long)]
        datetime: String,

        /// Comma-separated canonical bands (default: all)
        #[arg(long, value_delimiter = ',')]
        bands: Vec<Band>,
    },

    /// Fetch, reproject and merge scenes for an ROI
    Process(ProcessArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if let Some(path) = cli.log_file {
        logging.file = Some(path);
    }
    let _guard = init_logging(&logging)?;

    match cli.command {
        Commands::Roi { roi } => commands::roi::run(&roi, &config),
        Commands::Scenes {
            granule,
            datetime,
            bands,
        } => commands::scenes::run(&granule, &datetime, &bands, &config),
        Commands::Process(args) => commands::process::run(args, config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_process_flags() {
        let cli = Cli::try_parse_from([
            "hlscube", "--verbose", "process", "--roi", "field.geojson", "--scenes", "scenes.json", "--workers",
            "4", "--strict", "--timeout", "600",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Process(args) = cli.command else {
            panic!("expected process");
        };
        assert_eq!(args.workers, Some(4));
        assert!(args.strict);
        assert_eq!(args.timeout, Some(600));
        assert!(args.token.is_none());
    }

    #[test]
    fn test_parse_band_list() {
        let cli = Cli::try_parse_from([
            "hlscube", "scenes", "--granule", "HLS.S30.T33UUP.2023123T101559.v2.0", "--datetime",
            "2023-05-03T10:15:59.024Z", "--bands", "red,NIR,fmask",
        ])
        .unwrap();
        let Commands::Scenes { bands, .. } = cli.command else {
            panic!("expected scenes");
        };
        assert_eq!(bands, vec![Band::Red, Band::Nir, Band::Fmask]);
    }

    #[test]
    fn test_unknown_band_is_rejected() {
        let result = Cli::try_parse_from([
            "hlscube", "scenes", "--granule", "g", "--datetime", "d", "--bands", "thermal",
        ]);
        assert!(result.is_err());
    }
}
