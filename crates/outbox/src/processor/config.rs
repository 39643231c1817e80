// Outbox Processor Configuration
//
// Loaded from environment variables; every value has a safe default and is
// clamped to its documented bounds.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::BackoffPolicy;

const DEFAULT_INTERVAL_MS: u64 = 2_000;
const DEFAULT_BATCH_SIZE: usize = 50;
const MAX_BATCH_SIZE: usize = 500;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const MAX_MAX_ATTEMPTS: u32 = 100;
const DEFAULT_BASE_DELAY_MS: u64 = 2_000;
const DEFAULT_MAX_DELAY_MS: u64 = 300_000;
const DEFAULT_LEASE_MS: u64 = 60_000;
const MIN_LEASE_MS: u64 = 1_000;
/// Upper bound for any retry delay or lease; keeps `now + delay` representable
const MAX_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Execution context selected by `APP_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppEnv {
    Test,
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("test") => Self::Test,
            Some("development") | Some("dev") => Self::Development,
            _ => Self::Production,
        }
    }
}

/// Outbox processor configuration
///
/// Deserialized values go through the same clamps as the builders, and
/// [`OutboxProcessor::new`](super::OutboxProcessor::new) normalizes again, so
/// out-of-range values set on the public fields never reach a tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawProcessorConfig")]
pub struct ProcessorConfig {
    /// Whether ticks do any work
    pub enabled: bool,

    /// Minimum time between two ticks
    #[serde(with = "crate::reliability::duration_millis")]
    pub interval: Duration,

    /// Maximum events handled per tick (1..=500)
    pub batch_size: usize,

    /// How long a claim hides an event from other processors
    #[serde(with = "crate::reliability::duration_millis")]
    pub lease: Duration,

    /// Retry schedule and dead-letter threshold
    pub backoff: BackoffPolicy,
}

/// Unclamped wire form of [`ProcessorConfig`]
#[derive(Deserialize)]
struct RawProcessorConfig {
    enabled: bool,
    #[serde(with = "crate::reliability::duration_millis")]
    interval: Duration,
    batch_size: usize,
    #[serde(with = "crate::reliability::duration_millis")]
    lease: Duration,
    backoff: BackoffPolicy,
}

impl From<RawProcessorConfig> for ProcessorConfig {
    fn from(raw: RawProcessorConfig) -> Self {
        Self {
            enabled: raw.enabled,
            interval: raw.interval,
            batch_size: raw.batch_size,
            lease: raw.lease,
            backoff: raw.backoff,
        }
        .normalized()
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            batch_size: DEFAULT_BATCH_SIZE,
            lease: Duration::from_millis(DEFAULT_LEASE_MS),
            backoff: BackoffPolicy::new(
                DEFAULT_MAX_ATTEMPTS,
                Duration::from_millis(DEFAULT_BASE_DELAY_MS),
                Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            ),
        }
    }
}

impl ProcessorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `APP_ENV`: `test` forces the processor off; `development` needs an
    ///   explicit opt-in (default: production)
    /// - `OUTBOX_PROCESSOR_ENABLED`: Enable/disable the processor (default: true)
    /// - `OUTBOX_PROCESSOR_INTERVAL_MS`: Minimum time between ticks (default: 2000)
    /// - `OUTBOX_PROCESSOR_BATCH_SIZE`: Events per tick (default: 50, max: 500)
    /// - `OUTBOX_PROCESSOR_MAX_ATTEMPTS`: Dead-letter threshold (default: 10, max: 100)
    /// - `OUTBOX_PROCESSOR_BASE_DELAY_MS`: First retry delay (default: 2000)
    /// - `OUTBOX_PROCESSOR_MAX_DELAY_MS`: Retry delay cap (default: 300000)
    /// - `OUTBOX_PROCESSOR_LEASE_MS`: Claim lease (default: 60000, min: 1000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = AppEnv::parse(lookup("APP_ENV").as_deref());
        let explicit = lookup("OUTBOX_PROCESSOR_ENABLED").map(|v| is_truthy(&v));

        let enabled = match app_env {
            AppEnv::Test => false,
            AppEnv::Development => explicit.unwrap_or(false),
            AppEnv::Production => explicit.unwrap_or(true),
        };

        let parse_u64 = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let interval_ms = parse_u64("OUTBOX_PROCESSOR_INTERVAL_MS", DEFAULT_INTERVAL_MS);
        let batch_size = lookup("OUTBOX_PROCESSOR_BATCH_SIZE")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE);
        let max_attempts = lookup("OUTBOX_PROCESSOR_MAX_ATTEMPTS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let base_delay_ms = parse_u64("OUTBOX_PROCESSOR_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS);
        let max_delay_ms = parse_u64("OUTBOX_PROCESSOR_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS);
        let lease_ms = parse_u64("OUTBOX_PROCESSOR_LEASE_MS", DEFAULT_LEASE_MS);

        Self::new()
            .with_enabled(enabled)
            .with_interval(Duration::from_millis(interval_ms))
            .with_batch_size(batch_size)
            .with_lease(Duration::from_millis(lease_ms))
            .with_backoff(BackoffPolicy::new(
                max_attempts,
                Duration::from_millis(base_delay_ms),
                Duration::from_millis(max_delay_ms),
            ))
    }

    /// Enable or disable the processor
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the minimum time between ticks
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set batch size (clamped to 1..=500)
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Set the claim lease (one second to 30 days)
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease.clamp(Duration::from_millis(MIN_LEASE_MS), MAX_DELAY);
        self
    }

    /// Set the retry schedule
    ///
    /// `max_attempts` is clamped to 1..=100, both delays are capped at 30
    /// days and `max_delay` is raised to at least `base_delay`.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        let base_delay = backoff.base_delay.min(MAX_DELAY);
        self.backoff = BackoffPolicy::new(
            backoff.max_attempts.clamp(1, MAX_MAX_ATTEMPTS),
            base_delay,
            backoff.max_delay.clamp(base_delay, MAX_DELAY),
        );
        self
    }

    /// Set the dead-letter threshold (clamped to 1..=100)
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        let backoff = BackoffPolicy {
            max_attempts,
            ..self.backoff
        };
        self.with_backoff(backoff)
    }

    /// Get the retry schedule
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Re-apply every clamp, e.g. after the public fields were set directly
    pub fn normalized(self) -> Self {
        let (batch_size, lease, backoff) = (self.batch_size, self.lease, self.backoff);
        self.with_batch_size(batch_size)
            .with_lease(lease)
            .with_backoff(backoff)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[]));

        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_millis(2_000));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.lease, Duration::from_secs(60));
        assert_eq!(config.backoff.max_attempts, 10);
        assert_eq!(config.backoff.base_delay, Duration::from_millis(2_000));
        assert_eq!(config.backoff.max_delay, Duration::from_millis(300_000));
    }

    #[test]
    fn test_test_env_forces_disabled() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[
            ("APP_ENV", "test"),
            ("OUTBOX_PROCESSOR_ENABLED", "true"),
        ]));
        assert!(!config.enabled);
    }

    #[test]
    fn test_development_requires_opt_in() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[("APP_ENV", "development")]));
        assert!(!config.enabled);

        let config = ProcessorConfig::from_lookup(lookup_from(&[
            ("APP_ENV", "development"),
            ("OUTBOX_PROCESSOR_ENABLED", "yes"),
        ]));
        assert!(config.enabled);
    }

    #[test]
    fn test_production_can_opt_out() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[
            ("APP_ENV", "production"),
            ("OUTBOX_PROCESSOR_ENABLED", "false"),
        ]));
        assert!(!config.enabled);
    }

    #[test]
    fn test_values_are_clamped() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[
            ("OUTBOX_PROCESSOR_BATCH_SIZE", "10000"),
            ("OUTBOX_PROCESSOR_MAX_ATTEMPTS", "0"),
            ("OUTBOX_PROCESSOR_BASE_DELAY_MS", "5000"),
            ("OUTBOX_PROCESSOR_MAX_DELAY_MS", "100"),
            ("OUTBOX_PROCESSOR_LEASE_MS", "10"),
        ]));

        assert_eq!(config.batch_size, 500);
        assert_eq!(config.backoff.max_attempts, 1);
        assert_eq!(config.backoff.max_delay, Duration::from_millis(5_000));
        assert_eq!(config.lease, Duration::from_secs(1));

        let config = ProcessorConfig::new()
            .with_batch_size(0)
            .with_max_attempts(1_000);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.backoff.max_attempts, 100);
    }

    #[test]
    fn test_delays_are_capped() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[
            ("OUTBOX_PROCESSOR_BASE_DELAY_MS", "100000000000000000"),
            ("OUTBOX_PROCESSOR_MAX_DELAY_MS", "100000000000000000"),
            ("OUTBOX_PROCESSOR_LEASE_MS", "100000000000000000"),
        ]));

        assert_eq!(config.backoff.base_delay, MAX_DELAY);
        assert_eq!(config.backoff.max_delay, MAX_DELAY);
        assert_eq!(config.lease, MAX_DELAY);
        assert_eq!(config.backoff.delay_for_attempt(40), MAX_DELAY);
    }

    #[test]
    fn test_deserialized_config_is_clamped() {
        let config: ProcessorConfig = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "interval": 2000,
            "batch_size": 100000,
            "lease": 0,
            "backoff": {
                "max_attempts": 100000,
                "base_delay": 5000,
                "max_delay": 10
            }
        }))
        .unwrap();

        assert_eq!(config.batch_size, 500);
        assert_eq!(config.lease, Duration::from_secs(1));
        assert_eq!(config.backoff.max_attempts, 100);
        assert_eq!(config.backoff.max_delay, Duration::from_millis(5_000));
    }

    #[test]
    fn test_normalized_repairs_public_fields() {
        let mut config = ProcessorConfig::new();
        config.batch_size = 0;
        config.backoff.max_attempts = 0;
        config.lease = Duration::ZERO;

        let config = config.normalized();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.backoff.max_attempts, 1);
        assert_eq!(config.lease, Duration::from_secs(1));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[
            ("OUTBOX_PROCESSOR_BATCH_SIZE", "lots"),
            ("OUTBOX_PROCESSOR_INTERVAL_MS", "-5"),
        ]));

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.interval, Duration::from_millis(2_000));
    }
}
