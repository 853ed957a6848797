//! Top-level error type.

use thiserror::Error;

use crate::band::CatalogError;
use crate::config::ConfigError;
use crate::fetch::HttpError;
use crate::orchestrator::PipelineError;
use crate::processor::EDL_TOKEN_ENV;
use crate::roi::RoiError;

/// Errors surfaced by [`HlsProcessor`](crate::processor::HlsProcessor).
#[derive(Debug, Error)]
pub enum HlsError {
    /// No bearer token was passed and the environment has none.
    #[error("no Earthdata bearer token: pass one explicitly or set {}", EDL_TOKEN_ENV)]
    MissingToken,

    #[error(transparent)]
    Roi(#[from] RoiError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HlsError {
    /// Whether the run ended because the bearer token was rejected.
    pub fn is_credential(&self) -> bool {
        matches!(self, HlsError::Pipeline(PipelineError::Credential { .. }))
    }
}
