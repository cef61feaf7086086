//! Exponential backoff with full jitter, reused at every retryable call
//! site in the worker (`spec.md` §4.1, §4.4: "base 5s, multiplier 2,
//! max attempts 3, full jitter").

use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            base_delay,
            multiplier,
            max_attempts,
        }
    }

    /// Upper bound of the backoff window for a given (0-based) retry
    /// attempt; the actual delay is drawn uniformly from `[0, bound)`.
    fn bound_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let bound = self.bound_for_attempt(attempt);
        if bound.is_zero() {
            return bound;
        }
        let secs = rand::thread_rng().gen_range(0.0..bound.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Run `op` until it succeeds, `is_retryable` returns false for the
    /// error, or `max_attempts` attempts have been made.
    pub async fn run<T, E, F, Fut>(&self, mut is_retryable: impl FnMut(&E) -> bool, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < self.max_attempts && is_retryable(&err) => {
                    let delay = self.jittered_delay(attempt);
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
