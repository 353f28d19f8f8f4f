//! Reconnect backoff
//!
//! Exponential growth from `min` to `max` with optional full jitter. Reset
//! once a session joins.

use std::time::Duration;

use rand::Rng;

/// Backoff tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry, and after every reset
    pub min: Duration,
    /// Upper bound on any delay
    pub max: Duration,
    /// Growth factor applied after each attempt
    pub factor: f64,
    /// Randomize each delay within `[0, delay]`
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(format!("backoff factor must be >= 1.0, got {}", self.factor));
        }
        if self.min > self.max {
            return Err(format!(
                "backoff min ({:?}) exceeds max ({:?})",
                self.min, self.max
            ));
        }
        Ok(())
    }
}

/// Backoff state, owned by the supervisor.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.min,
            attempt: 0,
            config,
        }
    }

    /// Delay to wait before the next attempt. Advances the state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.config.max);
        self.current = self.grow(self.current);
        self.attempt = self.attempt.saturating_add(1);

        if self.config.jitter && !delay.is_zero() {
            rand::thread_rng().gen_range(Duration::ZERO..=delay)
        } else {
            delay
        }
    }

    /// Return to the minimum delay.
    pub fn reset(&mut self) {
        self.current = self.config.min;
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn grow(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.config.factor)
            .unwrap_or(self.config.max)
            .min(self.config.max)
    }
}
