//! Configuration Module
//!
//! Handles loading cache and server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Parameters the paged cache is constructed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Records per page (one fetch unit)
    pub page_size: usize,
    /// Idle time after which an unobserved page may be evicted
    pub page_timeout: Duration,
    /// Upper bound on the tail follower's wait for the first page after a reload
    pub reload_timeout: Duration,
    /// Request the adjacent page when access crosses a page's midpoint
    pub prefetch_neighbours: bool,
}

impl CacheOptions {
    /// Creates options with the given page size and timeout, other fields defaulted.
    pub fn new(page_size: usize, page_timeout: Duration) -> Self {
        Self {
            page_size,
            page_timeout,
            ..Self::default()
        }
    }

    /// Rejects option combinations the cache cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CacheError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.reload_timeout.is_zero() {
            return Err(CacheError::InvalidConfig(
                "reload_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            page_size: 500,
            page_timeout: Duration::from_millis(20_000),
            reload_timeout: Duration::from_millis(30_000),
            prefetch_neighbours: true,
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Records per page
    pub page_size: usize,
    /// Page idle timeout in milliseconds
    pub page_timeout_ms: u64,
    /// Reload wait bound in milliseconds
    pub reload_timeout_ms: u64,
    /// Whether neighbour pages are prefetched
    pub prefetch_neighbours: bool,
    /// Whether the demo journal reports look-ahead counts
    pub lookahead_count: bool,
    /// Interval between tail probes in milliseconds
    pub tail_poll_interval_ms: u64,
    /// Interval between synthetic journal appends in milliseconds (0 = off)
    pub append_interval_ms: u64,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `PAGE_SIZE` - Records per page (default: 500)
    /// - `PAGE_TIMEOUT_MS` - Page idle timeout (default: 20000)
    /// - `RELOAD_TIMEOUT_MS` - Reload wait bound (default: 30000)
    /// - `PREFETCH_NEIGHBOURS` - Neighbour prefetch on/off (default: true)
    /// - `LOOKAHEAD_COUNT` - Count one page past the rows read (default: false)
    /// - `TAIL_POLL_INTERVAL_MS` - Tail probe interval (default: 1000)
    /// - `APPEND_INTERVAL_MS` - Demo append interval, 0 disables (default: 2000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            page_size: env_or("PAGE_SIZE", defaults.page_size),
            page_timeout_ms: env_or("PAGE_TIMEOUT_MS", defaults.page_timeout_ms),
            reload_timeout_ms: env_or("RELOAD_TIMEOUT_MS", defaults.reload_timeout_ms),
            prefetch_neighbours: env_or("PREFETCH_NEIGHBOURS", defaults.prefetch_neighbours),
            lookahead_count: env_or("LOOKAHEAD_COUNT", defaults.lookahead_count),
            tail_poll_interval_ms: env_or("TAIL_POLL_INTERVAL_MS", defaults.tail_poll_interval_ms),
            append_interval_ms: env_or("APPEND_INTERVAL_MS", defaults.append_interval_ms),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Projects the cache-specific options.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            page_size: self.page_size,
            page_timeout: Duration::from_millis(self.page_timeout_ms),
            reload_timeout: Duration::from_millis(self.reload_timeout_ms),
            prefetch_neighbours: self.prefetch_neighbours,
        }
    }

    /// Tail poll interval as a Duration.
    pub fn tail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tail_poll_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 500,
            page_timeout_ms: 20_000,
            reload_timeout_ms: 30_000,
            prefetch_neighbours: true,
            lookahead_count: false,
            tail_poll_interval_ms: 1_000,
            append_interval_ms: 2_000,
            server_port: 3000,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
