//! Retry policy for transient transport failures.
//!
//! The policy only computes delays; the transport decides which failures are
//! transient and sleeps between attempts.

use std::time::Duration;

/// First backoff delay in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Ceiling for a single backoff delay in seconds.
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Growth factor between consecutive backoff delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a transport retries a request that failed transiently.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum RetryPolicy {
    /// Single attempt.
    #[default]
    None,

    /// Delay multiplied after each failure, capped at `max_delay`.
    ExponentialBackoff {
        /// Total attempts, counting the first request.
        max_attempts: u32,
        /// Pause before the first retry.
        initial_delay: Duration,
        /// Longest pause allowed.
        max_delay: Duration,
        /// Growth factor per retry.
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Exponential backoff with the default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Policy for a retry budget, i.e. the number of attempts after the first.
    ///
    /// A budget of zero means a single attempt.
    pub fn from_budget(retries: u32) -> Self {
        if retries == 0 {
            Self::None
        } else {
            Self::exponential(retries.saturating_add(1))
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// attempts are used up.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts() {
            return None;
        }

        match self {
            Self::None => None,
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = multiplier.powi((attempt - 1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::ExponentialBackoff { max_attempts, .. } => (*max_attempts).max(1),
        }
    }
}

/// Status codes worth another attempt: request timeout, throttling and 5xx.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}
