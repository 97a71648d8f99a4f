use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::errors::ServiceError;

/// Exponential backoff shared by service retries and channel reconnection.
///
/// Attempt `k` (1-based) waits `base_delay * 2^(k-1)`, capped at `max_delay`,
/// then widened by `± jitter_factor`.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Whether a retry numbered `attempt` is still within budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let exp_delay = self.base_delay.as_millis() as f64 * 2.0_f64.powi(exponent);
        let capped = exp_delay.min(self.max_delay.as_millis() as f64);

        if self.jitter_factor <= 0.0 {
            return Duration::from_millis(capped as u64);
        }

        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }

    /// Run `call` until it succeeds, fails fatally, or the attempt budget is spent.
    ///
    /// `max_attempts` counts calls, so a policy of 3 makes at most 3 calls and
    /// sleeps twice. The last error is returned when the budget runs out;
    /// callers can tell exhaustion apart by `is_retryable()` on it.
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempt >= self.max_attempts.max(1) => return Err(e),
                Err(e) => {
                    let delay = e.suggested_delay().unwrap_or_else(|| self.delay_for(attempt));
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
