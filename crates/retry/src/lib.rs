//! Exponential backoff retry, shared by every crate that talks to a
//! provider or skill service over the network.

use std::future::Future;
use std::time::Duration;

use corvus_types::{Classify, ErrorKind};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// `base * 2^attempt`, capped at `max_delay_ms`. `attempt` is zero-based.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.min(32));
        let ms = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Same curve, but doubled before the cap is applied. Rate-limit
    /// responses mean the provider asked us to back off harder than a
    /// plain transport hiccup would warrant.
    pub fn delay_for_rate_limit(&self, attempt: u32) -> Duration {
        let base = self.delay_for(attempt).as_millis() as u64;
        Duration::from_millis(base.saturating_mul(2).min(self.max_delay_ms))
    }
}

/// Runs `f`, retrying on errors whose [`ErrorKind`] is retryable, up to
/// `policy.max_attempts` total tries. Non-retryable errors return
/// immediately on the first failure.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = err.kind().is_retryable();
                let exhausted = attempt + 1 >= policy.max_attempts;
                if !retryable || exhausted {
                    return Err(err);
                }
                let delay = if err.kind() == ErrorKind::RateLimit {
                    policy.delay_for_rate_limit(attempt)
                } else {
                    policy.delay_for(attempt)
                };
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Whether the given kind would ever be attempted more than once under this
/// policy (distinct from `ErrorKind::is_retryable`, which only answers
/// whether the kind is transient in principle).
pub fn will_retry(policy: &RetryPolicy, kind: ErrorKind) -> bool {
    kind.is_retryable() && policy.max_attempts > 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_types::CoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, 1, 10);
        let calls_clone = calls.clone();

        let result: Result<&str, CoreError> = retry(&policy, move || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CoreError::transport("not yet"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();
        let calls_clone = calls.clone();

        let result: Result<(), CoreError> = retry(&policy, move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::auth("bad key"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, 1, 10);
        let calls_clone = calls.clone();

        let result: Result<(), CoreError> = retry(&policy, move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::transport("still down"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy::new(10, 100, 1000);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_millis(1000));
    }
}
