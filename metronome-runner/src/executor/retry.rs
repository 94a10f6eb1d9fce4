//! Retry decorator
//!
//! Wraps any executor with exponential backoff: up to 3 retries (4 attempts
//! total), starting near 500 ms, doubling with jitter, capped. Retry
//! exhaustion surfaces the last underlying error. The backoff sleep lives on
//! the caller's future, so cancellation stops retrying immediately.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use metronome_core::domain::job::Job;
use rand::Rng;

use super::Executor;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Wraps an executor with the retry mechanism.
pub fn with_retry(inner: Box<dyn Executor>) -> Box<dyn Executor> {
    Box::new(RetryExecutor { inner })
}

struct RetryExecutor {
    inner: Box<dyn Executor>,
}

#[async_trait]
impl Executor for RetryExecutor {
    async fn execute(&self, job: &Job) -> Result<()> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;

        loop {
            let err = match self.inner.execute(job).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            attempt += 1;
            if attempt > MAX_RETRIES {
                return Err(err);
            }

            let delay = jittered(backoff);
            tracing::debug!(
                job_id = %job.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "job execution failed, backing off"
            );

            tokio::time::sleep(delay).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

/// Randomizes a delay into [0.5, 1.5) of its base so that synchronized
/// failures across runners do not retry in lockstep.
fn jittered(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::super::tests::http_job;
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingExecutor {
        calls: Arc<AtomicU32>,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl Executor for CountingExecutor {
        async fn execute(&self, _job: &Job) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                bail!("execute error");
            }

            Ok(())
        }
    }

    fn counting(failures_left: u32) -> (Box<dyn Executor>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = CountingExecutor {
            calls: Arc::clone(&calls),
            failures_left: AtomicU32::new(failures_left),
        };
        (with_retry(Box::new(executor)), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retrying() {
        let (executor, calls) = counting(0);
        executor.execute(&http_job()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let (executor, calls) = counting(2);
        executor.execute(&http_job()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_stops_after_four_attempts() {
        let (executor, calls) = counting(10);

        let start = tokio::time::Instant::now();
        let err = executor.execute(&http_job()).await.unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.to_string(), "execute error");

        // Three backoffs of at least half of 500ms, 1s and 2s.
        assert!(elapsed >= Duration::from_millis(1750), "elapsed: {elapsed:?}");
    }
}
