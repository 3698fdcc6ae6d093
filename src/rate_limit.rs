//! Adaptive delay between requests.
//!
//! The delay shrinks slowly while requests keep succeeding and grows quickly
//! when the service pushes back.

use std::time::Duration;

use tracing::{debug, warn};

/// Successes in a row before the delay is decayed.
pub const SUCCESS_STREAK: u32 = 10;
pub const DECAY_FACTOR: f64 = 0.9;
pub const RATE_LIMIT_GROWTH: f64 = 2.0;
pub const ERROR_GROWTH: f64 = 1.2;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    pub base_delay: f64,
    pub min_delay: f64,
    pub max_delay: f64,
    current_delay: f64,
    error_count: u32,
    success_count: u32,
}

impl RateLimiter {
    /// Delays are in seconds. `min_delay` above `max_delay` is swapped.
    pub fn new(base_delay: f64, min_delay: f64, max_delay: f64) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };
        let base_delay = base_delay.max(0.0);

        Self {
            base_delay,
            min_delay,
            max_delay,
            current_delay: base_delay,
            error_count: 0,
            success_count: 0,
        }
    }

    pub fn current_delay(&self) -> f64 {
        self.current_delay
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    /// The delay `wait` would sleep for right now.
    pub fn effective_delay(&self) -> Duration {
        let secs = self.current_delay.clamp(self.min_delay, self.max_delay);
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub async fn wait(&self, description: &str) {
        let delay = self.effective_delay();
        if delay.as_secs_f64() > 1.0 {
            debug!("{}: sleeping {:.1}s", description, delay.as_secs_f64());
        }
        tokio::time::sleep(delay).await;
    }

    pub fn on_success(&mut self) {
        self.error_count = 0;
        self.success_count += 1;

        if self.success_count >= SUCCESS_STREAK {
            self.current_delay = (self.current_delay * DECAY_FACTOR).max(self.min_delay);
            self.success_count = 0;
            debug!("Delay decreased to {:.1}s", self.current_delay);
        }
    }

    pub fn on_error(&mut self, is_rate_limit: bool) {
        self.success_count = 0;
        self.error_count += 1;

        if is_rate_limit {
            self.current_delay = (self.current_delay * RATE_LIMIT_GROWTH).min(self.max_delay);
            warn!(
                "Rate limit hit, delay increased to {:.1}s",
                self.current_delay
            );
        } else {
            self.current_delay = (self.current_delay * ERROR_GROWTH).min(self.max_delay);
            debug!("Error, delay increased to {:.1}s", self.current_delay);
        }
    }

    pub fn reset(&mut self) {
        self.current_delay = self.base_delay;
        self.error_count = 0;
        self.success_count = 0;
    }

    /// Change the base delay and restart from it.
    pub fn set_base_delay(&mut self, base_delay: f64) {
        self.base_delay = base_delay.max(0.0);
        self.reset();
    }
}

/// Exponential backoff: `base_delay * multiplier^error_count`, capped at `max_delay`.
pub fn calculate_rate_limit_delay(
    error_count: u32,
    base_delay: f64,
    multiplier: f64,
    max_delay: f64,
) -> f64 {
    let exponent = i32::try_from(error_count).unwrap_or(i32::MAX);
    let delay = base_delay * multiplier.powi(exponent);
    if delay.is_finite() {
        delay.min(max_delay)
    } else {
        max_delay
    }
}
