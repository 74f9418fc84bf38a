//! Retry and timeout configuration for activities.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for activity execution.
///
/// `max_attempts` counts every invocation, including the first one.
///
/// # Examples
///
/// ```
/// use stepline_core::RetryPolicy;
/// use std::time::Duration;
///
/// // Three attempts, waiting 10ms, then 20ms
/// let policy = RetryPolicy::exponential(3, Duration::from_millis(10));
/// assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(10));
/// assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(20));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Constant delay between attempts.
    Fixed {
        /// Total number of attempts.
        max_attempts: u32,
        /// Delay between attempts.
        #[serde(with = "duration_millis")]
        delay: Duration,
    },
    /// Delay multiplied after every failed attempt, up to a cap.
    ExponentialBackoff {
        /// Total number of attempts.
        max_attempts: u32,
        /// Delay after the first failed attempt.
        #[serde(with = "duration_millis")]
        initial_delay: Duration,
        /// Maximum delay cap.
        #[serde(with = "duration_millis")]
        max_delay: Duration,
        /// Factor applied per failed attempt (e.g. 2 doubles the delay).
        multiplier: u32,
    },
}

/// Error returned when [`RetryPolicy`] configuration is invalid.
///
/// # Examples
///
/// ```
/// use stepline_core::RetryPolicy;
/// use std::time::Duration;
///
/// let result = RetryPolicy::exponential_backoff(
///     3,
///     Duration::from_millis(100),
///     Duration::from_secs(10),
///     0,
/// );
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicyError(pub &'static str);

impl std::fmt::Display for RetryPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RetryPolicyError {}

impl RetryPolicy {
    /// Creates a fixed-delay policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Creates an exponential policy waiting `backoff * 2^(attempt-1)` after
    /// each failed attempt, capped at 60 seconds.
    pub fn exponential(max_attempts: u32, backoff: Duration) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_attempts,
            initial_delay: backoff,
            max_delay: Duration::from_secs(60).max(backoff),
            multiplier: 2,
        }
    }

    /// Creates an exponential policy with custom settings.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] if:
    /// - `max_attempts` is 0
    /// - `multiplier` is 0 or greater than 10
    /// - `max_delay` is less than `initial_delay`
    pub fn exponential_backoff(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 {
            return Err(RetryPolicyError("max_attempts must be greater than 0"));
        }
        if multiplier == 0 {
            return Err(RetryPolicyError("multiplier must be greater than 0"));
        }
        if multiplier > 10 {
            return Err(RetryPolicyError(
                "multiplier must be 10 or less to avoid overflow",
            ));
        }
        if max_delay < initial_delay {
            return Err(RetryPolicyError("max_delay must be >= initial_delay"));
        }
        Ok(RetryPolicy::ExponentialBackoff {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    /// Total number of attempts, never less than one.
    pub fn max_attempts(&self) -> u32 {
        let attempts = match self {
            RetryPolicy::Fixed { max_attempts, .. } => *max_attempts,
            RetryPolicy::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        };
        attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryPolicy::Fixed { delay, .. } => *delay,
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let exponent = attempt.saturating_sub(1);
                let factor = (*multiplier as u64).saturating_pow(exponent);
                let delay = (initial_delay.as_millis() as u64).saturating_mul(factor);
                Duration::from_millis(delay.min(max_delay.as_millis() as u64))
            }
        }
    }
}

/// Timeout and retry settings for an activity.
///
/// # Examples
///
/// ```
/// use stepline_core::{ActivityConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let config = ActivityConfig {
///     timeout: Some(Duration::from_secs(5)),
///     retry_policy: Some(RetryPolicy::exponential(3, Duration::from_millis(100))),
/// };
/// assert_eq!(config.timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityConfig {
    /// Maximum time allowed for a single run. `None` means no timeout.
    #[serde(default, with = "option_duration_millis")]
    pub timeout: Option<Duration>,
    /// Retry policy used by `execute_with_retry`. `None` means one attempt.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

/// Serde support for Duration as milliseconds
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for `Option<Duration>` as milliseconds
pub mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
