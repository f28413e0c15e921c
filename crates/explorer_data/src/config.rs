//! Backend and cache configuration.

use std::time::Duration;

const DEFAULT_PRIMARY_MIRROR: &str = "https://api-1.explorer-mirror.example";
const DEFAULT_SECONDARY_MIRROR: &str = "https://api-2.explorer-mirror.example";
pub(crate) const DEFAULT_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_REAP_INTERVAL_MS: u64 = 60_000;

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub primary_mirror: String,
    pub secondary_mirror: String,
    /// Upper bound for one attempt against one origin.
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            primary_mirror: DEFAULT_PRIMARY_MIRROR.to_string(),
            secondary_mirror: DEFAULT_SECONDARY_MIRROR.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: concat!("explorer-data/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl BackendConfig {
    /// Defaults overlaid with `EXPLORER_PRIMARY_MIRROR`, `EXPLORER_SECONDARY_MIRROR`
    /// and `EXPLORER_TIMEOUT_MS`. Unparseable timeouts are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("EXPLORER_PRIMARY_MIRROR") {
            config.primary_mirror = v;
        }
        if let Ok(v) = std::env::var("EXPLORER_SECONDARY_MIRROR") {
            config.secondary_mirror = v;
        }
        if let Some(ms) = std::env::var("EXPLORER_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.timeout_ms = ms;
        }
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Oldest entry is evicted when an insert would exceed this.
    pub max_entries: usize,
    pub reap_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            reap_interval_ms: DEFAULT_REAP_INTERVAL_MS,
        }
    }
}

impl CacheConfig {
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

/// Freshness windows for one route: fresh below `ttl`, stale-but-usable until
/// `ttl + stale_while_revalidate`, expired after.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub stale_while_revalidate: Duration,
}

impl CachePolicy {
    pub fn from_millis(ttl_ms: u64, stale_while_revalidate_ms: u64) -> Self {
        Self {
            ttl: Duration::from_millis(ttl_ms),
            stale_while_revalidate: Duration::from_millis(stale_while_revalidate_ms),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.ttl + self.stale_while_revalidate
    }

    /// `cache-control` value for responses served under this policy.
    pub fn cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.ttl.as_secs(),
            self.stale_while_revalidate.as_secs()
        )
    }
}
