//! Exponential backoff with bounded jitter.
//!
//! Used by the publisher relay to schedule retries of failed events and by the
//! connection supervisor to pace reconnect attempts.
//!
//! The delay for attempt `n` (1-based) is `base * multiplier^(n-1)`, scaled by
//! a random factor in `[1, 1 + jitter]`, then capped. With the defaults:
//!
//! | Attempt | Delay (before jitter) |
//! |---------|-----------------------|
//! | 1       | 1s                    |
//! | 2       | 2s                    |
//! | 3       | 4s                    |
//! | ...     | ...                   |
//! | 7+      | 60s (cap)             |
//!
//! Jitter is limited to `multiplier - 1`, which keeps the sequence of delays
//! non-decreasing: attempt `n + 1` always waits at least as long as attempt `n`.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffError {
    #[error("backoff multiplier must be >= 1.0, got {0}")]
    Multiplier(f64),
    #[error("backoff jitter must be within [0, multiplier - 1], got {jitter} with multiplier {multiplier}")]
    Jitter { jitter: f64, multiplier: f64 },
    #[error("backoff cap {cap:?} is below base {base:?}")]
    Cap { base: Duration, cap: Duration },
}

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    cap: Duration,
    jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}

impl Backoff {
    pub fn new(
        base: Duration,
        multiplier: f64,
        cap: Duration,
        jitter: f64,
    ) -> Result<Self, BackoffError> {
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(BackoffError::Multiplier(multiplier));
        }
        if !(0.0..=multiplier - 1.0).contains(&jitter) {
            return Err(BackoffError::Jitter { jitter, multiplier });
        }
        if cap < base {
            return Err(BackoffError::Cap { base, cap });
        }
        Ok(Self {
            base,
            multiplier,
            cap,
            jitter,
        })
    }

    /// Same policy without randomness.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 waits nothing.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = if self.jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(0.0..=self.jitter)
        } else {
            1.0
        };

        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let raw_secs = self.base.as_secs_f64() * self.multiplier.powi(exponent) * factor;
        let cap_secs = self.cap.as_secs_f64();

        if !raw_secs.is_finite() || raw_secs >= cap_secs {
            self.cap
        } else {
            Duration::from_secs_f64(raw_secs)
        }
    }
}
