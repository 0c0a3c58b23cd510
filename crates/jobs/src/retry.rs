use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::JobError;

/// Blocking wait between attempts. Swappable so tests can observe backoff
/// without spending wall time.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) { thread::sleep(duration); }
}

/// One retry policy for every external call a job makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { max_attempts: 3, backoff_cap: Duration::from_secs(10) } }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_cap: Duration) -> Self { Self { max_attempts: max_attempts.max(1), backoff_cap } }

    /// Wait after the `attempt`-th failure (1-based): `2^attempt` seconds,
    /// capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.backoff_cap)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt cap is reached. `op` receives the 1-based attempt number.
    pub fn run<T>(&self, sleeper: &dyn Sleeper, mut op: impl FnMut(u32) -> Result<T, JobError>) -> Result<T, JobError> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let wait = self.backoff(attempt);
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "retrying after: {e}");
                    sleeper.sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) { self.0.lock().push(duration); }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(80), Duration::from_secs(10));
    }

    #[test]
    fn gives_up_after_the_attempt_cap() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let out: Result<(), _> = RetryPolicy::default().run(&sleeper, |_| {
            calls += 1;
            Err(JobError::GenerationServerError { status: 503, body: "busy".into() })
        });
        assert!(matches!(out, Err(JobError::GenerationServerError { status: 503, .. })));
        assert_eq!(calls, 3);
        assert_eq!(sleeper.0.lock().len(), 2);
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let out: Result<(), _> = RetryPolicy::default().run(&sleeper, |_| {
            calls += 1;
            Err(JobError::GenerationRejected { status: 400, body: "bad prompt".into() })
        });
        assert!(out.is_err());
        assert_eq!(calls, 1);
        assert!(sleeper.0.lock().is_empty());
    }
}
