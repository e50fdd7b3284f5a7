//! Retry policy for failed deliveries.
//!
//! ```text
//! attempt 1 ──fail──→ wait initial ──→ attempt 2 ──fail──→ wait initial*m ──→ ...
//!                                                             (capped at max_backoff)
//! attempt == max_attempts ──fail──→ dead-letter
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::duration_serde;
use super::errors::{PubSubError, PubSubResult};
use crate::DEFAULT_MAX_ATTEMPTS;

/// Per-subscription retry and timeout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total delivery attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_serde")]
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    #[serde(with = "duration_serde")]
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
    /// A callback running longer than this counts as a failure.
    #[serde(with = "duration_serde")]
    pub callback_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2,
            callback_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Deliver once; dead-letter on the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn validate(&self) -> PubSubResult<()> {
        if self.max_attempts == 0 {
            return Err(PubSubError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(PubSubError::InvalidConfig(format!(
                "initial_backoff {:?} exceeds max_backoff {:?}",
                self.initial_backoff, self.max_backoff
            )));
        }
        if self.callback_timeout.is_zero() {
            return Err(PubSubError::InvalidConfig(
                "callback_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Whether another attempt follows the given failed attempt.
    pub fn should_retry(&self, failed_attempt: u32) -> bool {
        failed_attempt < self.max_attempts
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1);
        let factor = self
            .multiplier
            .max(1)
            .checked_pow(exponent)
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
