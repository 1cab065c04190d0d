// Exponential backoff with full-range jitter, plus the default
// retryability classification. Grounded on the teacher's `retry_delay`/
// `apply_jitter`/`is_retryable_status` trio, generalized from a fixed
// 1s/30s backoff into caller-configurable `base_delay`/`max_delay`.

use crate::error::CoreError;
use crate::request::Response;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

pub type ShouldRetryFn = Arc<dyn Fn(&CoreError, Option<&Response>) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
    pub should_retry: Option<ShouldRetryFn>,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter_factor", &self.jitter_factor)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.2,
            should_retry: None,
        }
    }
}

impl RetryConfig {
    /// Delay before retry attempt `n` (1-indexed, `n=1` is the first
    /// retry after the initial call): `min(base * mult^(n-1), max)`,
    /// jittered by `±jitter_factor` uniformly, floored at zero. So with
    /// `base=10ms, mult=2` the first retry waits 10ms, the second 20ms
    /// (spec §8 scenario 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = Self::apply_jitter(capped, self.jitter_factor);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    fn apply_jitter(delay_secs: f64, jitter_factor: f64) -> f64 {
        if jitter_factor <= 0.0 {
            return delay_secs;
        }
        let u: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        delay_secs + delay_secs * jitter_factor * u
    }

    /// Default retryability (spec §4.3/§7), unless overridden by
    /// `should_retry`.
    pub fn is_retryable(&self, err: &CoreError, resp: Option<&Response>) -> bool {
        if let Some(custom) = &self.should_retry {
            return custom(err, resp);
        }
        if let Some(resp) = resp {
            return is_retryable_status(resp.status);
        }
        err.is_retryable()
    }
}

/// HTTP status retryability: 408/429/5xx retry, other 4xx do not.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}
