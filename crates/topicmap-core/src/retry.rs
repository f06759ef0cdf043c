use std::time::Duration;
use tracing::warn;

use crate::config::RetrySettings;
use crate::error::{Error, Result};

/// Shared retry policy for every external network call.
///
/// Attempt `n` (1-based) that fails with a retryable error sleeps `base * 2^(n-1)`,
/// capped at `max_delay`, before the next attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    retryable: fn(&Error) -> bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay, max_delay, retryable: Error::is_retryable }
    }

    pub fn from_settings(s: &RetrySettings) -> Self {
        Self::new(s.max_attempts, Duration::from_millis(s.base_delay_ms), Duration::from_millis(s.max_delay_ms))
    }

    /// Single attempt, no sleeping.
    pub fn none() -> Self { Self::new(1, Duration::ZERO, Duration::ZERO) }

    #[must_use]
    pub fn with_predicate(mut self, retryable: fn(&Error) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && (self.retryable)(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(call = what, attempt, max_attempts = self.max_attempts, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self { Self::from_settings(&RetrySettings::default()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn provider(status: Option<u16>) -> Error { Error::Provider { status, message: "x".into() } }

    #[test]
    fn retries_transient_then_succeeds() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(4, Duration::ZERO, Duration::ZERO);
        let out = policy.run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(provider(Some(503))) } else { Ok(7) }
        });
        assert_eq!(out.expect("ok"), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn client_errors_fail_immediately() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(4, Duration::ZERO, Duration::ZERO);
        let out: Result<()> = policy.run("test", || { calls.set(calls.get() + 1); Err(provider(Some(400))) });
        assert!(out.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        let out: Result<()> = policy.run("test", || { calls.set(calls.get() + 1); Err(provider(None)) });
        assert!(out.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::new(6, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
        assert_eq!(p.delay_for(4), Duration::from_secs(5));
    }
}
