//! Deadlines and retries around blocking collaborator calls.
//!
//! Each call runs on its own thread and the caller waits on a channel with
//! `recv_timeout`. A call that misses its deadline is reported as
//! [`CallError::TimedOut`]; the worker thread is left to finish on its own and
//! its late answer is dropped.

use std::{sync::mpsc, thread, time::Duration};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Why a guarded call did not produce a value.
#[derive(Debug)]
pub enum CallError {
    /// The collaborator did not answer before the deadline.
    TimedOut(Duration),
    /// The collaborator returned an error (or panicked).
    Failed(anyhow::Error),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::TimedOut(after) => write!(f, "timed out after {after:?}"),
            CallError::Failed(e) => write!(f, "{e:#}"),
        }
    }
}

/// Run `call` on a helper thread and wait at most `timeout` for its result.
pub fn call_with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, CallError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // receiver may be gone if we already timed out
        let _ = tx.send(call());
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CallError::Failed(e)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(CallError::TimedOut(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(CallError::Failed(anyhow!("collaborator call panicked")))
        }
    }
}

/// Retry policy for transient collaborator failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, first one included. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Growth factor applied to the delay after every failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    /// 3 attempts, 500ms initial backoff, 2x multiplier, 5s cap.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after `failed_attempts` failures (1-indexed).
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }
        let delay = self.initial_backoff_ms as f64
            * self
                .backoff_multiplier
                .powi(failed_attempts.saturating_sub(1) as i32);
        Duration::from_millis((delay as u64).min(self.max_backoff_ms))
    }

    /// Call `attempt` until it succeeds or the attempts run out, sleeping between tries.
    ///
    /// Returns the last error when every attempt failed.
    pub fn run<T>(
        &self,
        operation: &str,
        mut attempt: impl FnMut() -> Result<T, CallError>,
    ) -> Result<T, CallError> {
        let mut failures = 0;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    failures += 1;
                    if failures >= self.max_attempts.max(1) {
                        warn!(operation, attempts = failures, "giving up: {e}");
                        return Err(e);
                    }
                    let delay = self.backoff(failures);
                    debug!(operation, attempt = failures, ?delay, "retrying after: {e}");
                    thread::sleep(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(5_000));
    }

    #[test]
    fn test_retry_until_success() {
        let calls = Cell::new(0);
        let result = fast_policy(3).run("op", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(CallError::Failed(anyhow!("flaky")))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_exhausted_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast_policy(2).run("op", || {
            calls.set(calls.get() + 1);
            Err(CallError::Failed(anyhow!("attempt {}", calls.get())))
        });
        assert_eq!(calls.get(), 2);
        match result {
            Err(CallError::Failed(e)) => assert_eq!(e.to_string(), "attempt 2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_timeout_is_reported() {
        let result = call_with_timeout(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            Ok(1)
        });
        assert!(matches!(result, Err(CallError::TimedOut(_))));
    }

    #[test]
    fn test_fast_call_and_failure() {
        assert_eq!(
            call_with_timeout(Duration::from_secs(5), || Ok(7)).unwrap(),
            7
        );
        let failed: Result<u8, _> =
            call_with_timeout(Duration::from_secs(5), || Err(anyhow!("boom")));
        assert!(matches!(failed, Err(CallError::Failed(_))));
    }

    #[test]
    fn test_panicking_call_is_a_failure() {
        let result: Result<u8, _> =
            call_with_timeout(Duration::from_secs(5), || panic!("collaborator bug"));
        assert!(matches!(result, Err(CallError::Failed(_))));
    }
}
