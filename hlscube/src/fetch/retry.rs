//! Retry state machine for a single tile download.
//!
//! # State Machine
//!
//! ```text
//! Attempting(n) --[ok]----------------------------> Succeeded
//! Attempting(n) --[credential error]--------------> Fatal
//! Attempting(n) --[transient, budget left]--------> Backoff(n, delay)
//! Attempting(n) --[transient, budget spent]-------> Dropped
//! Backoff(n, _) --[delay elapsed]-----------------> Attempting(n + 1)
//! Backoff(n, _) --[cancelled]---------------------> Dropped
//! ```
//!
//! `Succeeded`, `Fatal` and `Dropped` are terminal. The machine does no I/O
//! and never sleeps; the fetcher drives it and performs the waits.

use std::time::Duration;

use super::policy::RetryPolicy;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The token was rejected. Retrying cannot help.
    Credential,
    /// Network or server trouble that may clear up.
    Transient,
}

/// Where a download currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// Attempt `attempt` (1-based) is about to run or running.
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed transiently; wait `delay` before the next.
    Backoff { attempt: u32, delay: Duration },
    /// Terminal: the payload arrived.
    Succeeded,
    /// Terminal: the credential was rejected.
    Fatal,
    /// Terminal: the attempt budget was spent or the run was cancelled.
    Dropped,
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchState::Succeeded | FetchState::Fatal | FetchState::Dropped
        )
    }
}

/// Drives [`FetchState`] transitions for one download.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: FetchState,
    attempts: u32,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: FetchState::Attempting { attempt: 1 },
            attempts: 1,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records a successful attempt.
    pub fn succeed(&mut self) -> FetchState {
        if let FetchState::Attempting { .. } = self.state {
            self.state = FetchState::Succeeded;
        }
        self.state
    }

    /// Records a failed attempt and returns the next state.
    pub fn fail(&mut self, kind: FailureKind) -> FetchState {
        let FetchState::Attempting { attempt } = self.state else {
            return self.state;
        };
        self.state = match kind {
            FailureKind::Credential => FetchState::Fatal,
            FailureKind::Transient => match self.policy.delay_for_attempt(attempt) {
                Some(delay) => FetchState::Backoff { attempt, delay },
                None => FetchState::Dropped,
            },
        };
        self.state
    }

    /// Leaves backoff for the next attempt.
    pub fn resume(&mut self) -> FetchState {
        if let FetchState::Backoff { attempt, .. } = self.state {
            self.attempts = attempt + 1;
            self.state = FetchState::Attempting {
                attempt: self.attempts,
            };
        }
        self.state
    }

    /// Abandons the download, e.g. on cancellation.
    pub fn abandon(&mut self) -> FetchState {
        if !self.state.is_terminal() {
            self.state = FetchState::Dropped;
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let machine = RetryMachine::new(RetryPolicy::default());
        assert_eq!(machine.state(), FetchState::Attempting { attempt: 1 });
        assert_eq!(machine.attempts(), 1);
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut machine = RetryMachine::new(RetryPolicy::default());
        assert_eq!(machine.succeed(), FetchState::Succeeded);
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_credential_is_fatal_without_backoff() {
        let mut machine = RetryMachine::new(RetryPolicy::default());
        assert_eq!(machine.fail(FailureKind::Credential), FetchState::Fatal);
        // Terminal states ignore further input.
        assert_eq!(machine.resume(), FetchState::Fatal);
        assert_eq!(machine.succeed(), FetchState::Fatal);
    }

    #[test]
    fn test_transient_walks_the_backoff_schedule() {
        let mut machine = RetryMachine::new(RetryPolicy::default());
        let mut delays = Vec::new();
        loop {
            match machine.fail(FailureKind::Transient) {
                FetchState::Backoff { delay, .. } => {
                    delays.push(delay.as_secs());
                    machine.resume();
                }
                other => {
                    assert_eq!(other, FetchState::Dropped);
                    break;
                }
            }
        }
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_success_after_four_transient_failures() {
        let mut machine = RetryMachine::new(RetryPolicy::default());
        for _ in 0..4 {
            assert!(matches!(
                machine.fail(FailureKind::Transient),
                FetchState::Backoff { .. }
            ));
            machine.resume();
        }
        assert_eq!(machine.state(), FetchState::Attempting { attempt: 5 });
        assert_eq!(machine.succeed(), FetchState::Succeeded);
        assert_eq!(machine.attempts(), 5);
    }

    #[test]
    fn test_abandon_from_backoff() {
        let mut machine = RetryMachine::new(RetryPolicy::default());
        machine.fail(FailureKind::Transient);
        assert_eq!(machine.abandon(), FetchState::Dropped);
    }

    #[test]
    fn test_no_retry_policy_drops_immediately() {
        let mut machine = RetryMachine::new(RetryPolicy::None);
        assert_eq!(machine.fail(FailureKind::Transient), FetchState::Dropped);
    }
}
