//! Backoff policy implementation

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule for failed dispatches
///
/// `delay(n) = min(base_delay * 2^(n-1), max_delay)` where `n` is the 1-based
/// number of the attempt that just failed. No jitter: the schedule is exact.
///
/// # Example
///
/// ```
/// use fleetops_outbox::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::new(10, Duration::from_secs(2), Duration::from_secs(300));
///
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Attempt number at which a failure dead-letters the event
    pub max_attempts: u32,

    /// Delay after the first failure
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,

    /// Upper bound on any delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(2_000),
            max_delay: Duration::from_millis(300_000),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);

        // 2^exponent overflows u32 from 32 on; the cap is long reached by then
        let delay = match 2u32.checked_pow(exponent) {
            Some(factor) => self.base_delay.saturating_mul(factor),
            None => self.max_delay,
        };

        delay.min(self.max_delay)
    }

    /// Whether failed attempt `attempt` (1-based) exhausts the budget
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
