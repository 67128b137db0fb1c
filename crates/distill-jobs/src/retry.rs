//! Retry policy for provider calls in the summarizing stage.

use std::time::Duration;

use distill_core::{defaults, ProviderError};

/// What to do after a failed provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    RetryAfter(Duration),
    /// Surface the failure.
    GiveUp,
}

/// Exponential backoff with per-kind attempt caps.
///
/// Attempt counts include the first call, so `rate_limit_max_attempts = 5`
/// allows four retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub rate_limit_max_attempts: u32,
    pub unavailable_max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_max_attempts: defaults::RETRY_RATE_LIMIT_MAX_ATTEMPTS,
            unavailable_max_attempts: defaults::RETRY_UNAVAILABLE_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            rate_limit_max_attempts: 1,
            unavailable_max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set both backoff bounds.
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    pub fn with_rate_limit_attempts(mut self, attempts: u32) -> Self {
        self.rate_limit_max_attempts = attempts.max(1);
        self
    }

    pub fn with_unavailable_attempts(mut self, attempts: u32) -> Self {
        self.unavailable_max_attempts = attempts.max(1);
        self
    }

    /// Decide after `attempt` calls have been made, the last failing with `error`.
    pub fn decide(&self, error: &ProviderError, attempt: u32) -> RetryDecision {
        let max_attempts = match error {
            ProviderError::RateLimited { .. } => self.rate_limit_max_attempts,
            ProviderError::Unavailable(_) => self.unavailable_max_attempts,
            ProviderError::Auth(_) | ProviderError::BadRequest(_) => return RetryDecision::GiveUp,
        };
        if attempt >= max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = self.backoff(attempt);
        // the backend's hint is a floor
        let delay = error.retry_after().map_or(delay, |hint| delay.max(hint));
        RetryDecision::RetryAfter(delay)
    }

    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}
