// Three-state circuit breaker with an optional sliding-window failure-
// ratio rule layered on top of the consecutive-failure rule. The
// teacher's `CircuitBreaker` (atomics-based, two states: tripped/not)
// is generalized here into the full closed/open/half_open machine the
// spec requires; the single-mutex design keeps state transitions
// deterministic under concurrent updates (spec §4.4/§5).

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct SlidingWindowConfig {
    pub size: usize,
    pub failure_ratio_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
    pub half_open_max_allowed: u32,
    /// When set, the breaker also opens whenever the window is full and
    /// the failure ratio reaches the threshold — whichever rule trips
    /// first wins (see DESIGN.md).
    pub sliding_window: Option<SlidingWindowConfig>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_allowed: 1,
            sliding_window: None,
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_in_flight: u32,
    last_failure_time: Option<Instant>,
    window: VecDeque<bool>,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                half_open_in_flight: 0,
                last_failure_time: None,
                window: VecDeque::new(),
            }),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Admission check. Returns `true` if the request may proceed, and
    /// transitions `open` → `half_open` as a side effect once the
    /// timeout has elapsed (spec §4.4: "on the next admission").
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed() >= self.config.timeout)
                    .unwrap_or(false);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 0;
                    inner.consecutive_successes = 0;
                    drop(inner);
                    self.allow()
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_allowed {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        Self::push_window(&mut inner, &self.config, true);
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                    inner.window.clear();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_time = Some(Instant::now());
        inner.consecutive_successes = 0;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.state = CircuitState::Open;
                inner.consecutive_failures = 0;
                inner.window.clear();
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                let window_tripped = Self::push_window(&mut inner, &self.config, false);
                if inner.consecutive_failures >= self.config.failure_threshold || window_tripped {
                    inner.state = CircuitState::Open;
                    inner.consecutive_failures = 0;
                    inner.window.clear();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Appends to the sliding window (when configured) and reports
    /// whether the failure-ratio rule trips on this update.
    fn push_window(inner: &mut Inner, config: &CircuitBreakerConfig, success: bool) -> bool {
        let Some(window_cfg) = &config.sliding_window else {
            return false;
        };
        inner.window.push_back(success);
        while inner.window.len() > window_cfg.size {
            inner.window.pop_front();
        }
        if inner.window.len() < window_cfg.size {
            return false;
        }
        let failures = inner.window.iter().filter(|s| !**s).count();
        let ratio = failures as f64 / inner.window.len() as f64;
        ratio >= window_cfg.failure_ratio_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_millis(50),
            half_open_max_allowed: 1,
            sliding_window: None,
        }
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new(config());
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn success_resets_failure_counter() {
        let cb = CircuitBreaker::new(config());
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn transitions_to_half_open_after_timeout_then_closes() {
        let cb = CircuitBreaker::new(config());
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        sleep(Duration::from_millis(60));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(config());
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        sleep(Duration::from_millis(60));
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_admits_at_most_configured_concurrency() {
        let mut cfg = config();
        cfg.half_open_max_allowed = 1;
        let cb = CircuitBreaker::new(cfg);
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        sleep(Duration::from_millis(60));
        assert!(cb.allow());
        assert!(!cb.allow());
    }

    #[test]
    fn sliding_window_rule_can_trip_before_consecutive_threshold() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 100,
            success_threshold: 2,
            timeout: Duration::from_millis(50),
            half_open_max_allowed: 1,
            sliding_window: Some(SlidingWindowConfig {
                size: 4,
                failure_ratio_threshold: 0.5,
            }),
        };
        let cb = CircuitBreaker::new(cfg);
        cb.record_success();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
