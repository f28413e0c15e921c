//! Per-route wrapper: validation, cache-key derivation, SWR caching, error envelope.

mod contract;
mod error;
mod wrapper;

pub use contract::{cache_key, ContractError, Params, RouteContract};
pub use error::{degrade_unavailable, RouteError};
pub use wrapper::{
    create_route, CacheHandle, CacheStatus, Payload, Route, RouteHandler, RouteResponse,
};
