//! Process configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Per-community settings live in the repository, not here.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `PostgreSQL` configuration
    pub postgres: PostgresConfig,
    /// Engine tuning
    pub desk: DeskSettings,
    /// Prometheus scrape address
    pub metrics_addr: SocketAddr,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection URL; `None` runs on the in-memory repository
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl PostgresConfig {
    /// Connection timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// Engine settings shared by every community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskSettings {
    /// Period of the auto-expiry sweep
    pub sweep_interval: Duration,
    /// Delay between the closure notice and the channel deletion
    pub delete_countdown: Duration,
    /// Re-derive a missing cooldown entry from the latest stored ticket
    pub cooldown_from_repository: bool,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3600),
            delete_countdown: Duration::from_secs(5),
            cooldown_from_repository: true,
        }
    }
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl DeskSettings {
    /// Load engine settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval: Duration::from_secs(var_or(
                "TICKET_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            delete_countdown: Duration::from_secs(var_or(
                "TICKET_DELETE_COUNTDOWN_SECS",
                defaults.delete_countdown.as_secs(),
            )),
            cooldown_from_repository: var_or(
                "TICKET_COOLDOWN_FROM_REPOSITORY",
                defaults.cooldown_from_repository,
            ),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            postgres: PostgresConfig {
                url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10),
                connect_timeout: var_or("DATABASE_CONNECT_TIMEOUT", 30),
            },
            desk: DeskSettings::from_env(),
            metrics_addr: var_or(
                "METRICS_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 9090)),
            ),
        }
    }
}
