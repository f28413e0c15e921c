//! Resilient backend access: origins, ordered failover, health counters.

mod client;
mod error;
mod failover;
mod health;
mod origin;

pub use client::BackendClient;
pub use error::{AttemptError, AttemptFailure, UpstreamError};
pub use failover::{fetch_with_failover, Fetched};
pub use health::{HealthBook, HealthReport, OriginHealth};
pub use origin::{build_http_client, BackendRequest, HttpOrigin, Origin};
