//! Process-local stale-while-revalidate cache with injected clock.

mod clock;
mod inflight;
mod swr;

pub use clock::{Clock, ManualClock, SystemClock};
pub use inflight::{spawn_revalidation, InflightGuard, InflightSet};
pub use swr::{CacheRead, Freshness, SwrCache};
