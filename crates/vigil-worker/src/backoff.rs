//! Exponential backoff between delivery attempts

use std::time::Duration;
use vigil_core::RetrySettings;

/// Backoff configuration for redelivery.
///
/// The delay after failed attempt `k` (1-indexed) is
/// `min(initial_delay * multiplier^(k-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for BackoffConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            multiplier: settings.multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

impl BackoffConfig {
    /// Delay to wait after failed attempt `attempt` before the next one
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= cap {
            return self.max_delay;
        }
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// State of one in-flight message: which attempt is running and how long to wait
/// before the next one if it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub attempt: u32,
    pub max_attempts: u32,
    /// `None` on the last attempt
    pub next_delay: Option<Duration>,
}

impl DeliveryAttempt {
    pub fn first(config: &BackoffConfig) -> Self {
        Self::nth(config, 1)
    }

    fn nth(config: &BackoffConfig, attempt: u32) -> Self {
        let max_attempts = config.max_attempts.max(1);
        let next_delay = (attempt < max_attempts).then(|| config.delay_for_attempt(attempt));
        Self {
            attempt,
            max_attempts,
            next_delay,
        }
    }

    pub fn is_last(&self) -> bool {
        self.next_delay.is_none()
    }

    /// The following attempt, or `None` once attempts are exhausted
    pub fn advance(&self, config: &BackoffConfig) -> Option<Self> {
        if self.is_last() {
            return None;
        }
        Some(Self::nth(config, self.attempt + 1))
    }
}
