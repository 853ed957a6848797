//! Policy types controlling how tile fetches retry and how a batch reacts
//! to tiles that never arrive.
//!
//! - [`RetryPolicy`]: how a single fetch handles transient failures
//! - [`FailurePolicy`]: whether a dropped tile shrinks the output or aborts the run
//!
//! # Example
//!
//! ```ignore
//! use hlscube::fetch::{FailurePolicy, RetryPolicy};
//!
//! // 5 attempts: waits of 1s, 2s, 4s, 8s between them
//! let retry = RetryPolicy::default();
//!
//! // Abort the whole run on the first unreadable tile
//! let failure = FailurePolicy::Strict;
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default number of attempts per tile, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay after the first failed attempt (1 second).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;

/// Default ceiling for a single backoff (32 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 32;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a fetch handles transient failures.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - drop the tile after the first transient failure.
    None,

    /// Exponential backoff.
    ///
    /// The delay after attempt `n` is `initial_delay * multiplier^(n-1)`,
    /// capped at `max_delay`.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
        /// Multiplier applied after each failure.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Exponential backoff starting at 1 s, doubling, capped at 32 s.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    ///
    /// Returns `None` once the attempt budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    /// Maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

/// What a batch does with a tile that could not be produced.
///
/// Credential failures are not governed by this policy: they always stop
/// the run and surface as a distinct error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Drop the tile and keep going with whatever succeeds.
    #[default]
    BestEffort,

    /// Abort the batch with a read error on the first dropped tile.
    Strict,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::BestEffort => f.write_str("best-effort"),
            FailurePolicy::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" | "besteffort" => Ok(FailurePolicy::BestEffort),
            "strict" => Ok(FailurePolicy::Strict),
            other => Err(format!(
                "unknown failure policy '{}', expected best-effort or strict",
                other
            )),
        }
    }
}
