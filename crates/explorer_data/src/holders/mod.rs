//! Holder-list snapshot: built out of band, swapped whole, queried in memory.

mod loader;
mod snapshot;
mod store;

use crate::upstream::UpstreamError;
use thiserror::Error;

pub use loader::{MirrorHolderLoader, SnapshotLoader};
pub use snapshot::{Holder, HolderSnapshot, SnapshotSummary};
pub use store::SnapshotStore;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("holder snapshot not loaded yet")]
    NotLoaded,
    #[error("upstream: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("malformed holder data: {0}")]
    Malformed(String),
}
