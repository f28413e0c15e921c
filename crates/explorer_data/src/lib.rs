//! explorer_data: resilient data access for a multi-chain explorer.
//!
//! Routes each logical request across a chain's own nodes and two proxy mirrors
//! with ordered failover, and layers a stale-while-revalidate cache and a
//! per-route wrapper (validation, cache keys, error envelope) on top.
//! Process-local state only; nothing is persisted.

pub mod api;
pub mod cache;
pub mod chain;
pub mod config;
pub mod holders;
pub mod route;
pub mod upstream;

pub use api::ApiRoutes;
pub use cache::{Clock, ManualClock, SwrCache, SystemClock};
pub use chain::{ChainRegistry, EndpointRole, RegistryError};
pub use config::{BackendConfig, CacheConfig, CachePolicy};
pub use holders::{HolderSnapshot, MirrorHolderLoader, SnapshotLoader, SnapshotStore};
pub use route::{create_route, CacheHandle, Params, Route, RouteContract, RouteError, RouteResponse};
pub use upstream::{
    fetch_with_failover, BackendClient, BackendRequest, Fetched, Origin, UpstreamError,
};
