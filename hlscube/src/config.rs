//! Run configuration.
//!
//! [`PipelineConfig`] is the in-memory configuration consumed by
//! [`HlsProcessor`](crate::processor::HlsProcessor). [`ConfigFile`] loads it,
//! together with logging settings, from an INI file:
//!
//! ```ini
//! [pipeline]
//! workers = 8
//! failure_policy = best-effort
//! run_timeout_secs = 0
//! http_timeout_secs = 60
//!
//! [retry]
//! # 1 disables retries
//! max_attempts = 5
//! initial_delay_ms = 1000
//! max_delay_secs = 32
//!
//! [roi]
//! max_area_km2 = 500
//!
//! [logging]
//! level = info
//! file = /var/log/hlscube.log
//! ```
//!
//! The bearer token never comes from this file. It is passed by the caller
//! or read from `EDL_TOKEN`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::band::BandCatalog;
use crate::fetch::policy::{DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_SECS};
use crate::fetch::{FailurePolicy, RetryPolicy, DEFAULT_HTTP_TIMEOUT};
use crate::logging::LoggingConfig;
use crate::orchestrator::DEFAULT_WORKERS;
use crate::roi::DEFAULT_MAX_AREA_KM2;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

// =============================================================================
// Pipeline configuration
// =============================================================================

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrent tile fetches.
    pub workers: usize,

    /// What happens to the run when a tile is dropped.
    pub failure_policy: FailurePolicy,

    /// Limit for the whole fetch phase. `None` waits indefinitely.
    pub run_timeout: Option<Duration>,

    /// Per-request HTTP timeout.
    pub http_timeout: Duration,

    /// Retry schedule for transient fetch failures.
    pub retry: RetryPolicy,

    /// ROI area ceiling in km².
    pub max_area_km2: f64,

    /// Band-to-source-code mapping used when expanding granules.
    pub band_catalog: BandCatalog,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            failure_policy: FailurePolicy::default(),
            run_timeout: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            retry: RetryPolicy::default(),
            max_area_km2: DEFAULT_MAX_AREA_KM2,
            band_catalog: BandCatalog::default(),
        }
    }
}

impl PipelineConfig {
    /// Set the worker count (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_area_km2(mut self, max_area_km2: f64) -> Self {
        self.max_area_km2 = max_area_km2;
        self
    }

    pub fn with_band_catalog(mut self, catalog: BandCatalog) -> Self {
        self.band_catalog = catalog;
        self
    }
}

// =============================================================================
// INI file
// =============================================================================

/// Contents of a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// `<config dir>/hlscube/config.ini`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hlscube").join("config.ini"))
    }

    /// Loads `path`. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Loads `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_ini_str(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents)?;
        Self::from_ini(&ini)
    }

    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(props) = ini.section(Some("pipeline")) {
            let pipeline = &mut config.pipeline;
            if let Some(workers) = parse_key::<usize>(props, "pipeline", "workers")? {
                if workers == 0 {
                    return Err(invalid("pipeline", "workers", "0"));
                }
                pipeline.workers = workers;
            }
            if let Some(policy) = parse_key::<FailurePolicy>(props, "pipeline", "failure_policy")? {
                pipeline.failure_policy = policy;
            }
            if let Some(secs) = parse_key::<u64>(props, "pipeline", "run_timeout_secs")? {
                pipeline.run_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
            if let Some(secs) = parse_key::<u64>(props, "pipeline", "http_timeout_secs")? {
                if secs == 0 {
                    return Err(invalid("pipeline", "http_timeout_secs", "0"));
                }
                pipeline.http_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(props) = ini.section(Some("retry")) {
            let max_attempts = parse_key::<u32>(props, "retry", "max_attempts")?.unwrap_or(DEFAULT_MAX_ATTEMPTS);
            let initial_delay_ms =
                parse_key::<u64>(props, "retry", "initial_delay_ms")?.unwrap_or(DEFAULT_INITIAL_DELAY_MS);
            let max_delay_secs = parse_key::<u64>(props, "retry", "max_delay_secs")?.unwrap_or(DEFAULT_MAX_DELAY_SECS);
            if max_attempts == 0 {
                return Err(invalid("retry", "max_attempts", "0"));
            }
            config.pipeline.retry = if max_attempts == 1 {
                RetryPolicy::None
            } else {
                RetryPolicy::ExponentialBackoff {
                    max_attempts,
                    initial_delay: Duration::from_millis(initial_delay_ms),
                    max_delay: Duration::from_secs(max_delay_secs),
                    multiplier: DEFAULT_BACKOFF_MULTIPLIER,
                }
            };
        }

        if let Some(props) = ini.section(Some("roi")) {
            if let Some(max) = parse_key::<f64>(props, "roi", "max_area_km2")? {
                if !(max.is_finite() && max > 0.0) {
                    return Err(invalid("roi", "max_area_km2", &max.to_string()));
                }
                config.pipeline.max_area_km2 = max;
            }
        }

        if let Some(props) = ini.section(Some("logging")) {
            if let Some(level) = props.get("level") {
                config.logging.level = level.trim().to_string();
            }
            if let Some(file) = props.get("file").map(str::trim).filter(|f| !f.is_empty()) {
                config.logging.file = Some(PathBuf::from(file));
            }
        }

        Ok(config)
    }
}

fn parse_key<T: FromStr>(props: &Properties, section: &str, key: &str) -> Result<Option<T>, ConfigError> {
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(section, key, raw)),
    }
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}
