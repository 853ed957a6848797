//! Authenticated tile downloads with retry and cancellation.
//!
//! - [`http`]: the [`HttpClient`] seam and its reqwest implementation
//! - [`policy`]: retry schedule and batch failure policy
//! - [`retry`]: per-download retry state machine
//! - [`fetcher`]: download, decode and clip one (scene, band) tile

pub mod fetcher;
pub mod http;
pub mod policy;
pub mod retry;

pub use fetcher::{clip_to_roi, FetchError, TileError, TileFetcher};
pub use http::{BoxFuture, HttpClient, HttpError, ReqwestClient, DEFAULT_HTTP_TIMEOUT};
pub use policy::{FailurePolicy, RetryPolicy};
pub use retry::{FailureKind, FetchState, RetryMachine};
