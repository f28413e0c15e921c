//! Chain endpoint lookup.

mod registry;

pub(crate) use registry::parse_endpoint;
pub use registry::{ChainEntry, ChainRegistry, Endpoint, EndpointRole, RegistryError};
