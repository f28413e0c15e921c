//! Atomically swapped holder snapshot.

use crate::holders::loader::SnapshotLoader;
use crate::holders::snapshot::HolderSnapshot;
use crate::holders::SnapshotError;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Readers get an `Arc` to a whole snapshot; the lock is held only for the swap.
#[derive(Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<HolderSnapshot>>>,
    /// Serializes rebuilds so a cold start does not run two.
    rebuild: tokio::sync::Mutex<()>,
}

impl SnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current(&self) -> Option<Arc<HolderSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current snapshot or `NotLoaded`.
    pub fn require(&self) -> Result<Arc<HolderSnapshot>, SnapshotError> {
        self.current().ok_or(SnapshotError::NotLoaded)
    }

    pub fn replace(&self, snapshot: HolderSnapshot) -> Arc<HolderSnapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&snapshot));
        info!(
            holders = snapshot.len(),
            previous = previous.map(|p| p.len()),
            "holder snapshot swapped"
        );
        snapshot
    }

    /// Current snapshot, rebuilding first if none has been loaded yet.
    pub async fn load_snapshot(
        &self,
        loader: &dyn SnapshotLoader,
        cancel: &CancellationToken,
    ) -> Result<Arc<HolderSnapshot>, SnapshotError> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }
        let _rebuild = self.rebuild.lock().await;
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }
        let snapshot = loader.rebuild(cancel).await?;
        Ok(self.replace(snapshot))
    }

    /// Rebuild and swap. On failure the previous snapshot stays in place.
    pub async fn refresh(
        &self,
        loader: &dyn SnapshotLoader,
        cancel: &CancellationToken,
    ) -> Result<Arc<HolderSnapshot>, SnapshotError> {
        let _rebuild = self.rebuild.lock().await;
        let snapshot = loader.rebuild(cancel).await?;
        Ok(self.replace(snapshot))
    }

    /// Refresh every `period` until `cancel` fires. The first refresh runs immediately.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        loader: Arc<dyn SnapshotLoader>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh(loader.as_ref(), &cancel).await {
                            warn!(error = %e, "holder snapshot refresh failed, keeping previous");
                        }
                    }
                }
            }
        })
    }
}
