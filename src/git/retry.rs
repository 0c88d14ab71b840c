//! Jittered retry for network-bound git operations.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;

use super::error::GitError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MIN_SECONDS: u64 = 10;
pub const DEFAULT_MAX_SECONDS: u64 = 20;

/// Immutable retry configuration.
///
/// Backoff between attempts is `attempts_interval` when set, otherwise a
/// uniformly random whole number of seconds in `[min_seconds, max_seconds]`,
/// drawn fresh for every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_seconds: u64,
    max_seconds: u64,
    attempts_interval: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_seconds: DEFAULT_MIN_SECONDS,
            max_seconds: DEFAULT_MAX_SECONDS,
            attempts_interval: None,
        }
    }
}

impl RetryPolicy {
    /// Builds a policy, rejecting `min_seconds > max_seconds` when both are
    /// non-zero.
    pub fn new(
        max_attempts: u32,
        min_seconds: u64,
        max_seconds: u64,
        attempts_interval: Option<u64>,
    ) -> Result<Self, GitError> {
        if min_seconds != 0 && max_seconds != 0 && min_seconds > max_seconds {
            return Err(GitError::InvalidRetryBounds {
                min: min_seconds,
                max: max_seconds,
            });
        }
        Ok(Self {
            max_attempts,
            min_seconds,
            max_seconds,
            attempts_interval,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn min_seconds(&self) -> u64 {
        self.min_seconds
    }

    pub fn max_seconds(&self) -> u64 {
        self.max_seconds
    }

    pub fn attempts_interval(&self) -> Option<u64> {
        self.attempts_interval
    }

    /// Seconds to wait before the next attempt.
    pub fn backoff_seconds(&self) -> u64 {
        if let Some(interval) = self.attempts_interval {
            return interval;
        }
        // A zero max with a non-zero min passes validation; never draw
        // from an empty range.
        let upper = self.max_seconds.max(self.min_seconds);
        rand::rng().random_range(self.min_seconds..=upper)
    }
}

/// Runs an action under a [`RetryPolicy`].
///
/// Every attempt before the last is caught, logged and followed by a
/// backoff sleep. The last attempt runs bare, so its error reaches the
/// caller unchanged. `max_attempts` of 0 or 1 both mean a single attempt.
#[derive(Debug, Clone, Default)]
pub struct RetryHelper {
    policy: RetryPolicy,
}

impl RetryHelper {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<T, E, F, Fut>(&self, mut action: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        while attempt < self.policy.max_attempts {
            match action().await {
                Ok(value) => return Ok(value),
                Err(err) => log::info!("{err}"),
            }

            let seconds = self.policy.backoff_seconds();
            log::info!("Waiting {seconds} seconds before trying again");
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            attempt += 1;
        }

        action().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn failing(calls: &Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<(), String>> {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Err(format!("attempt {n} failed")))
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.min_seconds(), 10);
        assert_eq!(policy.max_seconds(), 20);
        assert_eq!(policy.attempts_interval(), None);
    }

    #[test]
    fn test_min_above_max_is_rejected() {
        let err = RetryPolicy::new(3, 20, 10, None).unwrap_err();
        assert!(matches!(err, GitError::InvalidRetryBounds { min: 20, max: 10 }));
    }

    #[test]
    fn test_zero_bound_skips_validation() {
        let policy = RetryPolicy::new(3, 5, 0, None).unwrap();
        assert_eq!(policy.backoff_seconds(), 5);
        let policy = RetryPolicy::new(3, 0, 0, None).unwrap();
        assert_eq!(policy.backoff_seconds(), 0);
    }

    #[test]
    fn test_backoff_within_bounds() {
        let policy = RetryPolicy::new(3, 2, 6, None).unwrap();
        for _ in 0..500 {
            let seconds = policy.backoff_seconds();
            assert!((2..=6).contains(&seconds), "backoff {seconds} out of range");
        }
    }

    #[test]
    fn test_backoff_uses_fixed_interval() {
        let policy = RetryPolicy::new(3, 2, 6, Some(42)).unwrap();
        for _ in 0..50 {
            assert_eq!(policy.backoff_seconds(), 42);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_runs_once_without_sleep() {
        let helper = RetryHelper::default();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let value = helper
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(7) }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_runs_max_attempts_and_returns_last_error() {
        let helper = RetryHelper::new(RetryPolicy::new(4, 1, 1, Some(3)).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let err = helper.execute(failing(&calls)).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err, "attempt 4 failed");
        // three sleeps between four attempts
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let helper = RetryHelper::new(RetryPolicy::new(3, 0, 0, None).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = helper
            .execute(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err("connection reset".to_string())
                    } else {
                        Ok("fetched")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "fetched");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_backoff_stays_in_range() {
        let helper = RetryHelper::new(RetryPolicy::new(2, 10, 20, None).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let _ = helper.execute(failing(&calls)).await;

        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(10) && waited <= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policies_never_retry() {
        for max_attempts in [0, 1] {
            let helper = RetryHelper::new(RetryPolicy::new(max_attempts, 10, 20, None).unwrap());
            let calls = Arc::new(AtomicU32::new(0));
            let start = Instant::now();

            let err = helper.execute(failing(&calls)).await.unwrap_err();

            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(err, "attempt 1 failed");
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }
}
