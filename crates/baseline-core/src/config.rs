//! Run-time tuning: concurrency, timeouts and retry policy.
//!
//! Both structs deserialize from the `[run]` and `[retry]` tables of the
//! configuration file. Every field has a default so a partial table is valid.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use baseline_contracts::error::{BaselineError, BaselineResult};

/// Scheduling limits for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Maximum number of concurrent inspections.
    pub max_concurrency: usize,
    /// Per-call timeout for every collaborator request.
    pub call_timeout_secs: u64,
    /// Overall deadline for the run.
    pub run_deadline_secs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout_secs: 30,
            run_deadline_secs: 900,
        }
    }
}

impl RunSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn validate(&self) -> BaselineResult<()> {
        if self.max_concurrency == 0 {
            return Err(BaselineError::ConfigError {
                reason: "run.max_concurrency must be at least 1".to_string(),
            });
        }
        if self.call_timeout_secs == 0 {
            return Err(BaselineError::ConfigError {
                reason: "run.call_timeout_secs must be at least 1".to_string(),
            });
        }
        if self.run_deadline_secs < self.call_timeout_secs {
            return Err(BaselineError::ConfigError {
                reason: "run.run_deadline_secs must not be shorter than run.call_timeout_secs"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Bounded exponential backoff for retryable apply failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after every further attempt.
    pub factor: f64,
    /// Relative jitter: 0.2 spreads each delay over ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay to wait after failed attempt number `attempt`
    /// (1-based): base, base·factor, base·factor², …
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let ms = self.base_delay_ms as f64 * self.factor.powi(exponent);
        Duration::from_millis(ms.max(0.0) as u64)
    }

    /// `delay_after(attempt)` with random jitter applied.
    pub fn jittered_delay_after(&self, attempt: u32) -> Duration {
        let delay = self.delay_after(attempt);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = rand::rng().random_range(-self.jitter..=self.jitter);
        let ms = (delay.as_millis() as f64 * (1.0 + spread)).max(0.0) as u64;
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> BaselineResult<()> {
        if self.max_attempts == 0 {
            return Err(BaselineError::ConfigError {
                reason: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.factor < 1.0 {
            return Err(BaselineError::ConfigError {
                reason: "retry.factor must be at least 1.0".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(BaselineError::ConfigError {
                reason: "retry.jitter must be in [0.0, 1.0)".to_string(),
            });
        }
        Ok(())
    }
}
