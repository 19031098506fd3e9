// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from the environment and, for the
//! `poller` binary, from process flags.

use std::env;
use std::time::Duration;

/// Deployment-level configuration: secrets and connection strings. Loaded
/// once at startup by both binaries.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Strava OAuth client ID (public).
    pub strava_client_id: String,
    /// Strava OAuth client secret.
    pub strava_client_secret: String,
    /// Base URL of the Strava API, overridable so tests can point at a
    /// mock server.
    pub strava_base_url: String,
    /// Port the status server listens on.
    pub port: u16,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/strava_poller_test".to_string(),
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            strava_base_url: "https://www.strava.com/api/v3".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to a
    /// `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            strava_base_url: env::var("STRAVA_BASE_URL")
                .unwrap_or_else(|_| "https://www.strava.com/api/v3".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

/// Process-level flags for the `poller` daemon. Every flag falls back to an
/// environment variable of the same name, then to the documented default,
/// so the daemon is configurable identically from a shell or a container
/// orchestrator.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "poller", about = "Mirrors Strava activity history into Postgres")]
pub struct PollerArgs {
    /// Log verbosity: trace, debug, info, warn, error.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub loglevel: String,

    /// Number of concurrent fetch workers.
    #[arg(long, env = "WORKER_COUNT", default_value_t = 4)]
    pub worker_count: usize,

    /// Seconds to sleep between idle scheduler ticks.
    #[arg(long, env = "POLL_SLEEP_SECS", default_value_t = 5)]
    pub poll_sleep_secs: u64,

    /// Minimum gap, in seconds, between two LATEST fetches of the same user.
    #[arg(long, env = "LATEST_INTERVAL_SECS", default_value_t = 300)]
    pub latest_interval_secs: u64,

    /// Lookback window, in days, for LATEST mode's `after` cutoff.
    #[arg(long, env = "LATEST_LOOKBACK_DAYS", default_value_t = 14)]
    pub latest_lookback_days: i64,

    /// `per_page` used for LATEST mode's activity listing call.
    #[arg(long, env = "LATEST_LOOKBACK_PER_PAGE", default_value_t = 50)]
    pub latest_lookback_per_page: i32,

    /// `per_page` used for FULL mode's activity listing call.
    #[arg(long, env = "FULL_FETCH_PER_PAGE", default_value_t = 20)]
    pub full_fetch_per_page: i32,

    /// How long, in seconds, the scheduler waits for in-flight jobs to
    /// drain on shutdown before giving up.
    #[arg(long, env = "SHUTDOWN_DEADLINE_SECS", default_value_t = 30)]
    pub shutdown_deadline_secs: u64,

    /// Connect timeout for upstream calls, in seconds.
    #[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_connect_timeout_secs: u64,

    /// Read timeout for upstream calls, in seconds.
    #[arg(long, env = "UPSTREAM_READ_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_read_timeout_secs: u64,

    /// Maximum number of adapter handles the client pool may materialize.
    /// `0` means unbounded (fabricate on demand, never block).
    #[arg(long, env = "POOL_MAX_SIZE", default_value_t = 4)]
    pub pool_max_size: usize,
}

impl PollerArgs {
    pub fn poll_sleep(&self) -> Duration {
        Duration::from_secs(self.poll_sleep_secs)
    }

    pub fn latest_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.latest_interval_secs as i64)
    }

    pub fn latest_lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.latest_lookback_days)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_secs)
    }

    pub fn upstream_read_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_read_timeout_secs)
    }
}
