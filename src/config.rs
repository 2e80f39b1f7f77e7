//! Configuration
//!
//! Pool and sync-engine tunables, resolvable from a host-supplied
//! [`ConfigSource`]. The source is the host's option store (an FTP server's
//! directive table, environment, whatever); the engine only ever asks it for
//! string values by key and applies defaults for anything absent.
//!
//! Recognized keys:
//!
//! | Key                     | Default | Meaning                                  |
//! |-------------------------|---------|------------------------------------------|
//! | `pool.minConnections`   | 1       | connections opened eagerly at init       |
//! | `pool.maxConnections`   | 8       | hard cap on live connections             |
//! | `pool.idleTimeoutMs`    | 300000  | context age before idle expiry           |
//! | `pool.acquireTimeoutMs` | 5000    | bound on blocking waits for a context    |
//! | `sync.tickIntervalMs`   | 10000   | period of the synchronization timer      |

use std::time::Duration;

use crate::error::{Error, Result};

/// Host-supplied configuration lookup.
///
/// The engine resolves options through this trait rather than reading the
/// environment itself, so the host stays in control of where settings live.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// A source with no values; every option takes its default.
pub struct EmptySource;

impl ConfigSource for EmptySource {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Connection-pool tunables.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections opened eagerly by `Pool::init`.
    pub min_connections: usize,
    /// Hard cap on concurrently live connections.
    pub max_connections: usize,
    /// A context older than this is destroyed on release instead of being
    /// returned to the free set.
    pub idle_timeout: Duration,
    /// Bound on how long `acquire` blocks for a free context.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 8,
            idle_timeout: Duration::from_millis(300_000),
            acquire_timeout: Duration::from_millis(5_000),
        }
    }
}

impl PoolConfig {
    /// Resolve from a host source, applying defaults for absent keys.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            min_connections: get_count(source, "pool.minConnections", defaults.min_connections)?,
            max_connections: get_count(source, "pool.maxConnections", defaults.max_connections)?,
            idle_timeout: get_millis(source, "pool.idleTimeoutMs", defaults.idle_timeout)?,
            acquire_timeout: get_millis(source, "pool.acquireTimeoutMs", defaults.acquire_timeout)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent settings before any connection is opened.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::InvalidArgument(
                "pool.maxConnections must be at least 1".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::InvalidArgument(format!(
                "pool.minConnections ({}) exceeds pool.maxConnections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Sync
// =============================================================================

/// Synchronization-engine tunables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the recurring synchronization timer. Also bounds how long a
    /// pass may wait for a pooled connection before aborting.
    pub tick_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10_000),
        }
    }
}

impl SyncConfig {
    /// Resolve from a host source, applying defaults for absent keys.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            tick_interval: get_millis(source, "sync.tickIntervalMs", defaults.tick_interval)?,
        };
        if config.tick_interval.is_zero() {
            return Err(Error::InvalidArgument(
                "sync.tickIntervalMs must be positive".into(),
            ));
        }
        Ok(config)
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn get_count(source: &dyn ConfigSource, key: &str, default: usize) -> Result<usize> {
    match source.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            Error::InvalidArgument(format!("{key}: expected a count, got {raw:?}"))
        }),
    }
}

fn get_millis(source: &dyn ConfigSource, key: &str, default: Duration) -> Result<Duration> {
    match source.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| {
                Error::InvalidArgument(format!("{key}: expected milliseconds, got {raw:?}"))
            }),
    }
}

// =============================================================================
// Tests
// =============================================================================
