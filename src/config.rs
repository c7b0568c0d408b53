//! Environment-driven configuration
//!
//! All settings come from environment variables (optionally loaded from a
//! `.env` file by the binary). Unset or unparsable values fall back to the
//! defaults below.

use crate::error::{GameError, GameResult};
use crate::store::HttpStore;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Timing of the per-device control loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Lobby and round polling interval
    pub poll_interval: Duration,
    /// Voting countdown display tick
    pub countdown_tick: Duration,
    /// How often a device refreshes its own `last_seen_at`
    pub heartbeat_interval: Duration,
    /// Players silent for longer than this are pruned by the host
    pub prune_timeout: Duration,
    /// Minimum time between two host prune sweeps
    pub prune_every: Duration,
    /// Vote reveal unlocks this long after voting starts, even without all votes
    pub voting_countdown: Duration,
    /// Chat lines kept for display; stage and turn always fold the full round
    pub event_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            countdown_tick: Duration::from_millis(250),
            heartbeat_interval: Duration::from_secs(30),
            prune_timeout: Duration::from_secs(120),
            prune_every: Duration::from_secs(10),
            voting_countdown: Duration::from_secs(30),
            event_limit: 200,
        }
    }
}

impl SyncConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            poll_interval: Duration::from_millis(env_or(
                "IMPOSTER_POLL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            countdown_tick: Duration::from_millis(env_or(
                "IMPOSTER_COUNTDOWN_TICK_MS",
                defaults.countdown_tick.as_millis() as u64,
            )),
            heartbeat_interval: Duration::from_secs(env_or(
                "IMPOSTER_HEARTBEAT_SECS",
                defaults.heartbeat_interval.as_secs(),
            )),
            prune_timeout: Duration::from_secs(env_or(
                "IMPOSTER_PRUNE_TIMEOUT_SECS",
                defaults.prune_timeout.as_secs(),
            )),
            prune_every: Duration::from_secs(env_or(
                "IMPOSTER_PRUNE_EVERY_SECS",
                defaults.prune_every.as_secs(),
            )),
            voting_countdown: Duration::from_secs(env_or(
                "IMPOSTER_VOTING_SECS",
                defaults.voting_countdown.as_secs(),
            )),
            event_limit: env_or("IMPOSTER_EVENT_LIMIT", defaults.event_limit),
        };

        tracing::info!(
            poll_ms = config.poll_interval.as_millis() as u64,
            heartbeat_secs = config.heartbeat_interval.as_secs(),
            prune_timeout_secs = config.prune_timeout.as_secs(),
            voting_secs = config.voting_countdown.as_secs(),
            "Sync config loaded"
        );
        config
    }
}

/// Where devices find the shared store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base URL of the store server (None = multi-device mode disabled)
    pub url: Option<String>,
    pub request_timeout: Duration,
}

impl StoreConfig {
    /// Load config from `IMPOSTER_STORE_URL` and `IMPOSTER_STORE_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let url = std::env::var("IMPOSTER_STORE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if url.is_none() {
            tracing::warn!(
                "IMPOSTER_STORE_URL is not set. Multi-device mode will not work until it is configured."
            );
        }

        Self {
            url,
            request_timeout: Duration::from_secs(env_or("IMPOSTER_STORE_TIMEOUT_SECS", 10)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// Build the HTTP store client, or `NotConfigured` without a URL
    pub fn connect(&self) -> GameResult<HttpStore> {
        let url = self.url.as_deref().ok_or(GameError::NotConfigured)?;
        Ok(HttpStore::new(url, self.request_timeout)?)
    }
}

/// Store server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let default_addr = SocketAddr::from(([0, 0, 0, 0], 4173));
        let listen_addr = match std::env::var("IMPOSTER_LISTEN_ADDR") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
                tracing::warn!("Invalid IMPOSTER_LISTEN_ADDR {:?}: {}", raw, e);
                default_addr
            }),
            Err(_) => default_addr,
        };
        Self { listen_addr }
    }
}
