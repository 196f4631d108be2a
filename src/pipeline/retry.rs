use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Bounded-attempt, linear-backoff retry strategy for the external vision
/// call. Between attempt `n` and `n + 1` it waits `base_delay * n`. Every
/// error from the wrapped operation is treated as retryable; exhaustion
/// surfaces the last error. Invoked once per job, no state across jobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Run `op` until it succeeds, the attempts are used up, or the token
    /// is cancelled. Cancellation aborts the inter-attempt wait
    /// immediately.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if self.max_attempts == 0 {
            return Err(RetryError::NoAttempts);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(attempt, max_attempts = self.max_attempts, "analysis attempt");

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if cancel.is_cancelled() {
                        return Err(RetryError::Cancelled);
                    }
                    if attempt >= self.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: error,
                        });
                    }

                    tracing::warn!(attempt, error = %error, "analysis attempt failed, retrying");
                    let delay = self.base_delay * attempt;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::fmt::Display> {
    #[error("all {attempts} analysis attempts failed: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("cancelled while retrying")]
    Cancelled,

    #[error("no attempts permitted (max_attempts is 0)")]
    NoAttempts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<u32, RetryError<&str>> = policy
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts_and_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<String>> = policy
            .run(&cancel, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("boom {attempt}")) }
            })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "boom 3");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff_spacing() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let cancel = CancellationToken::new();
        let times = std::sync::Mutex::new(Vec::new());

        let _: Result<(), RetryError<&str>> = policy
            .run(&cancel, |_| {
                times.lock().unwrap().push(Instant::now());
                async { Err("unavailable") }
            })
            .await;

        let times = times.into_inner().unwrap();
        assert_eq!(times.len(), 3);
        // base_delay * 1 between attempts 1→2, base_delay * 2 between 2→3.
        assert!(times[1] - times[0] >= Duration::from_millis(1000));
        assert!(times[2] - times[1] >= Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_zero_attempts_never_calls() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<&str>> = policy
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            })
            .await;

        assert!(matches!(result, Err(RetryError::NoAttempts)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_backoff_wait() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result: Result<(), RetryError<&str>> = policy
            .run(&cancel, |_| async { Err("unavailable") })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        // Aborted during the first 60s backoff wait, not after it.
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
