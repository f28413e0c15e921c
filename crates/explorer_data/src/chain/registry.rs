//! Chain endpoint registry: chain identifier -> ordered RPC / REST endpoint lists.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("chain not found: {0}")]
    ChainNotFound(String),
    #[error("no {role} endpoints for chain {chain}")]
    NoEndpoints { chain: String, role: EndpointRole },
    #[error("invalid endpoint {address}: {reason}")]
    InvalidEndpoint { address: String, reason: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Rpc,
    Api,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc => f.write_str("rpc"),
            Self::Api => f.write_str("api"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Endpoint {
    pub address: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChainEntry {
    pub chain_name: String,
    pub chain_id: String,
    #[serde(default)]
    pub rpc: Vec<Endpoint>,
    #[serde(default)]
    pub api: Vec<Endpoint>,
}

impl ChainEntry {
    fn endpoints(&self, role: EndpointRole) -> &[Endpoint] {
        match role {
            EndpointRole::Rpc => &self.rpc,
            EndpointRole::Api => &self.api,
        }
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    chains: Vec<ChainEntry>,
}

/// Read-only lookup of chain endpoints. Array position is priority.
#[derive(Clone, Debug, Default)]
pub struct ChainRegistry {
    chains: Vec<ChainEntry>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainEntry>) -> Self {
        Self { chains }
    }

    /// Parse `{"chains": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        Ok(Self::new(file.chains))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Match by chain id exactly, or by chain name ignoring case.
    pub fn chain(&self, chain: &str) -> Result<&ChainEntry, RegistryError> {
        let wanted = chain.trim();
        self.chains
            .iter()
            .find(|c| c.chain_id == wanted || c.chain_name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| RegistryError::ChainNotFound(wanted.to_string()))
    }

    /// Ordered endpoint URLs for `role`. Empty lists are an error.
    pub fn endpoints(&self, chain: &str, role: EndpointRole) -> Result<Vec<Url>, RegistryError> {
        let entry = self.chain(chain)?;
        let list = entry.endpoints(role);
        if list.is_empty() {
            return Err(RegistryError::NoEndpoints {
                chain: entry.chain_name.clone(),
                role,
            });
        }
        list.iter().map(|e| parse_endpoint(&e.address)).collect()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

pub(crate) fn parse_endpoint(address: &str) -> Result<Url, RegistryError> {
    Url::parse(address.trim()).map_err(|e| RegistryError::InvalidEndpoint {
        address: address.to_string(),
        reason: e.to_string(),
    })
}
