//! Per-key in-flight markers for background revalidation.

use crate::cache::swr::SwrCache;
use crate::config::CachePolicy;
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct InflightSet {
    keys: Mutex<HashSet<String>>,
}

impl InflightSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark `key` as in flight. `None` if another refresh already holds it.
    pub fn try_begin(self: &Arc<Self>, key: &str) -> Option<InflightGuard> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(InflightGuard {
            set: Arc::clone(self),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clears its key on drop, whether the refresh succeeded, failed or panicked.
#[derive(Debug)]
pub struct InflightGuard {
    set: Arc<InflightSet>,
    key: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.set
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Launch a detached refresh of `key` unless one is already running.
///
/// `refresh` is not polled when a refresh is already in flight. On success the
/// new value is stored; failures are logged and leave the current entry alone.
/// Returns whether a task was spawned.
pub fn spawn_revalidation<V, E, F>(
    cache: Arc<SwrCache<V>>,
    inflight: &Arc<InflightSet>,
    key: &str,
    policy: CachePolicy,
    refresh: F,
) -> bool
where
    V: Clone + Send + 'static,
    E: Display + Send + 'static,
    F: Future<Output = Result<V, E>> + Send + 'static,
{
    let Some(guard) = inflight.try_begin(key) else {
        debug!(key = %key, "revalidation already in flight");
        return false;
    };
    let key = key.to_string();
    debug!(key = %key, "revalidation started");
    tokio::spawn(async move {
        let _guard = guard;
        match refresh.await {
            Ok(value) => {
                cache.set(&key, value, policy);
                debug!(key = %key, "revalidation stored");
            }
            Err(e) => warn!(key = %key, error = %e, "revalidation failed"),
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::time::Duration;

    #[test]
    fn guard_clears_on_drop() {
        let set = InflightSet::new();
        let guard = set.try_begin("k").unwrap();
        assert!(set.contains("k"));
        assert!(set.try_begin("k").is_none());
        assert!(set.try_begin("other").is_some());
        drop(guard);
        assert!(!set.contains("k"));
        assert!(set.try_begin("k").is_some());
    }

    #[tokio::test]
    async fn second_revalidation_is_skipped_while_first_runs() {
        let cache = Arc::new(SwrCache::<u32>::new(CacheConfig::default()));
        let inflight = InflightSet::new();
        let policy = CachePolicy::from_millis(1_000, 1_000);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let first = spawn_revalidation(cache.clone(), &inflight, "k", policy, async move {
            let _ = rx.await;
            Ok::<_, String>(7)
        });
        let second = spawn_revalidation(cache.clone(), &inflight, "k", policy, async {
            Ok::<_, String>(99)
        });
        assert!(first);
        assert!(!second);

        tx.send(()).unwrap();
        for _ in 0..50 {
            if inflight.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(inflight.is_empty());
        assert_eq!(cache.get("k", &policy), Some(7));
    }

    #[tokio::test]
    async fn failed_revalidation_keeps_old_value_and_clears_marker() {
        let cache = Arc::new(SwrCache::<u32>::new(CacheConfig::default()));
        let inflight = InflightSet::new();
        let policy = CachePolicy::from_millis(1_000, 1_000);
        cache.set("k", 1, policy);
        assert!(spawn_revalidation(
            cache.clone(),
            &inflight,
            "k",
            policy,
            async { Err::<u32, _>("upstream down") }
        ));
        for _ in 0..50 {
            if inflight.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(inflight.is_empty());
        assert_eq!(cache.get("k", &policy), Some(1));
    }
}
