//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use hlscube::band::CatalogError;
use hlscube::logging::LoggingError;
use hlscube::{ConfigError, HlsError, RoiError};

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// A file could not be read or written.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A file was not valid JSON for what it should hold.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A command-line value was rejected.
    InvalidArgument(String),
    /// Configuration file problem.
    Config(ConfigError),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// Library error.
    Hls(HlsError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            CliError::Json { path, source } => write!(f, "{}: invalid JSON: {}", path.display(), source),
            CliError::InvalidArgument(msg) => write!(f, "{}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Hls(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io { source, .. } => Some(source),
            CliError::Json { source, .. } => Some(source),
            CliError::InvalidArgument(_) => None,
            CliError::Config(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Hls(e) => Some(e),
        }
    }
}

impl From<HlsError> for CliError {
    fn from(e: HlsError) -> Self {
        CliError::Hls(e)
    }
}

impl From<RoiError> for CliError {
    fn from(e: RoiError) -> Self {
        CliError::Hls(HlsError::Roi(e))
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        CliError::Hls(HlsError::Catalog(e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}
