//! In-memory stale-while-revalidate cache.
//!
//! Freshness is derived from the entry age on every read: fresh below `ttl`,
//! stale-but-usable until `ttl + stale_while_revalidate`, expired after.
//! Expired entries read as misses whether or not the reaper has removed them.
//! The cache never performs I/O; revalidation is driven by callers.

use crate::cache::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, CachePolicy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

#[derive(Clone, Debug)]
pub struct CacheRead<V> {
    pub value: V,
    pub freshness: Freshness,
    pub age: Duration,
}

impl<V> CacheRead<V> {
    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
    /// Policy at insert time; only the reaper and eviction use it.
    policy: CachePolicy,
}

pub struct SwrCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

fn classify(age: Duration, policy: &CachePolicy) -> Option<Freshness> {
    if age < policy.ttl {
        Some(Freshness::Fresh)
    } else if age < policy.max_age() {
        Some(Freshness::Stale)
    } else {
        None
    }
}

impl<V: Clone> SwrCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        // Entries are replaced whole under the lock, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Value and freshness in one read. `None` for absent or expired keys.
    pub fn lookup(&self, key: &str, policy: &CachePolicy) -> Option<CacheRead<V>> {
        let now = self.clock.now();
        let entries = self.entries();
        let entry = entries.get(key)?;
        let age = now.saturating_duration_since(entry.stored_at);
        classify(age, policy).map(|freshness| CacheRead {
            value: entry.value.clone(),
            freshness,
            age,
        })
    }

    /// Fresh or stale-but-usable value; `None` is a miss.
    pub fn get(&self, key: &str, policy: &CachePolicy) -> Option<V> {
        self.lookup(key, policy).map(|read| read.value)
    }

    pub fn is_stale(&self, key: &str, policy: &CachePolicy) -> bool {
        self.lookup(key, policy)
            .map(|read| read.is_stale())
            .unwrap_or(false)
    }

    /// Insert or overwrite with `stored_at = now`.
    pub fn set(&self, key: &str, value: V, policy: CachePolicy) {
        let now = self.clock.now();
        let mut entries = self.entries();
        if !entries.contains_key(key) && entries.len() >= self.config.max_entries {
            Self::purge_locked(&mut entries, now);
            if entries.len() >= self.config.max_entries {
                Self::evict_oldest(&mut entries);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: now,
                policy,
            },
        );
    }

    /// Physically remove expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        Self::purge_locked(&mut entries, now)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn purge_locked(entries: &mut HashMap<String, Entry<V>>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.stored_at) < e.policy.max_age());
        before - entries.len()
    }

    fn evict_oldest(entries: &mut HashMap<String, Entry<V>>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, e)| e.stored_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            debug!(key = %key, "cache full, evicting oldest");
            entries.remove(&key);
        }
    }
}

impl<V: Clone + Send + 'static> SwrCache<V> {
    /// Periodically purge expired entries until `cancel` fires.
    pub fn spawn_reaper(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.config.reap_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.purge_expired();
                        debug!(removed, remaining = self.len(), "cache reaper sweep");
                    }
                }
            }
        })
    }
}
