//! Bounded polling for eventually-consistent reads.
//!
//! A [`RetryPolicy`] runs an operation until it yields a value, with a fixed
//! delay between attempts, a maximum attempt count and an overall deadline.
//! The operation reports "not there yet" as `Ok(None)`; any `Err` is final.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Why the attempts ran out.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt reported "not yet".
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// An attempt failed with a non-retryable error.
    #[error("attempt {attempt} failed: {source}")]
    Aborted {
        attempt: u32,
        #[source]
        source: E,
    },
}

/// Why a deadline-bounded poll gave up.
#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error(transparent)]
    Retry(#[from] RetryError<E>),

    /// The overall deadline passed first.
    #[error("timed out after {deadline:?}")]
    TimedOut { deadline: Duration },
}

/// Fixed-delay retry policy with an overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made before giving up (the first attempt counts).
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
    /// Wall-clock bound on the whole poll, in-flight attempt included.
    pub deadline: Duration,
}

impl RetryPolicy {
    /// Waiting for the webhook to create the order after payment: 10
    /// attempts 1.5 s apart, 30 s overall.
    ///
    /// The order is written by an asynchronous webhook, so this is the
    /// window the webhook has to make it visible.
    #[must_use]
    pub const fn order_reconciliation() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_millis(1500),
            deadline: Duration::from_secs(30),
        }
    }

    /// Run `op` under the deadline.
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// See [`PollError`].
    pub async fn poll<T, E, F, Fut>(&self, op: F) -> Result<T, PollError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        match tokio::time::timeout(self.deadline, self.retry(op)).await {
            Ok(result) => result.map_err(PollError::from),
            Err(_) => Err(PollError::TimedOut {
                deadline: self.deadline,
            }),
        }
    }

    /// Run `op` up to `max_attempts` times without applying the deadline.
    ///
    /// For callers that put the deadline around a larger unit of work.
    ///
    /// # Errors
    ///
    /// See [`RetryError`].
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.delay).await;
            }
            match op(attempt).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => tracing::debug!(attempt, max = self.max_attempts, "Not ready yet"),
                Err(source) => return Err(RetryError::Aborted { attempt, source }),
            }
        }

        Err(RetryError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::order_reconciliation()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_attempt() {
        let calls = counter();
        let start = Instant::now();

        let value = RetryPolicy::order_reconciliation()
            .poll(|attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>((attempt == 3).then_some("done"))
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_aborts_without_retrying() {
        let calls = counter();

        let result: Result<(), _> = RetryPolicy::order_reconciliation()
            .poll(|_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(std::io::Error::other("boom"))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(PollError::Retry(RetryError::Aborted { attempt: 1, .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_attempts() {
        let calls = counter();

        let result: Result<(), PollError<std::io::Error>> = RetryPolicy::order_reconciliation()
            .poll(|_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(PollError::Retry(RetryError::Exhausted { attempts: 10 }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_hung_attempt() {
        let start = Instant::now();

        let result: Result<(), PollError<std::io::Error>> = RetryPolicy::order_reconciliation()
            .poll(|_| async {
                std::future::pending::<()>().await;
                Ok(None)
            })
            .await;

        assert!(matches!(result, Err(PollError::TimedOut { .. })));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_alone_ignores_deadline() {
        let start = Instant::now();
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(20),
            deadline: Duration::from_secs(1),
        };

        let result: Result<(), RetryError<std::io::Error>> =
            policy.retry(|_| async { Ok(None) }).await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3 })));
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }
}
