// Worker Configuration
//
// Process-level settings; processor tuning lives in ProcessorConfig.

use std::env;
use std::time::Duration;

use anyhow::{bail, Result};

/// Outbox worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Connection pool size
    pub max_connections: u32,

    /// How often the scheduler attempts a tick
    pub scheduler_period: Duration,

    /// Apply pending migrations at startup
    pub run_migrations: bool,
}

impl WorkerConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
    /// - `OUTBOX_SCHEDULER_PERIOD_MS`: Tick attempt period (default: 2000)
    /// - `OUTBOX_RUN_MIGRATIONS`: Apply migrations at startup (default: true)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = match lookup("DATABASE_URL") {
            Some(url) if !url.trim().is_empty() => url,
            _ => bail!("DATABASE_URL must be set"),
        };

        let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(10);

        let period_ms = lookup("OUTBOX_SCHEDULER_PERIOD_MS")
            .and_then(|v| v.parse().ok())
            .filter(|n: &u64| *n > 0)
            .unwrap_or(2_000);

        let run_migrations = lookup("OUTBOX_RUN_MIGRATIONS")
            .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        Ok(Self {
            database_url,
            max_connections,
            scheduler_period: Duration::from_millis(period_ms),
            run_migrations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_is_required() {
        assert!(WorkerConfig::from_lookup(|_| None).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(|key| {
            (key == "DATABASE_URL").then(|| "postgres://localhost/fleetops".to_string())
        })
        .unwrap();

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.scheduler_period, Duration::from_secs(2));
        assert!(config.run_migrations);
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/fleetops".to_string()),
            "DATABASE_MAX_CONNECTIONS" => Some("4".to_string()),
            "OUTBOX_SCHEDULER_PERIOD_MS" => Some("500".to_string()),
            "OUTBOX_RUN_MIGRATIONS" => Some("false".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.max_connections, 4);
        assert_eq!(config.scheduler_period, Duration::from_millis(500));
        assert!(!config.run_migrations);
    }
}
