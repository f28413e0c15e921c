//! Backend client: the three failover shapes used by call sites.

use crate::chain::{parse_endpoint, ChainRegistry, EndpointRole, RegistryError};
use crate::config::BackendConfig;
use crate::upstream::error::UpstreamError;
use crate::upstream::failover::{fetch_with_failover, Fetched};
use crate::upstream::health::{HealthBook, HealthReport};
use crate::upstream::origin::{build_http_client, BackendRequest, HttpOrigin, Origin};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct BackendClient {
    config: BackendConfig,
    registry: Arc<ChainRegistry>,
    http: reqwest::Client,
    /// Primary mirror first, then secondary.
    mirrors: Vec<Arc<dyn Origin>>,
    health: HealthBook,
}

impl BackendClient {
    pub fn new(config: BackendConfig, registry: Arc<ChainRegistry>) -> Result<Self, UpstreamError> {
        let http = build_http_client(&config)?;
        let mirrors = [&config.primary_mirror, &config.secondary_mirror]
            .into_iter()
            .map(|addr| {
                parse_endpoint(addr)
                    .map(|url| Arc::new(HttpOrigin::new(url, http.clone())) as Arc<dyn Origin>)
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;
        Ok(Self {
            config,
            registry,
            http,
            mirrors,
            health: HealthBook::default(),
        })
    }

    /// Request for `path` carrying the configured per-attempt timeout.
    pub fn request(&self, path: impl Into<String>) -> BackendRequest {
        BackendRequest::get(path).timeout(self.config.timeout())
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn health(&self) -> HealthReport {
        self.health.report()
    }

    /// Chain's own `role` endpoints in registry order, then both mirrors.
    ///
    /// A chain with no endpoints for `role` falls back to the mirrors alone;
    /// an unknown chain is an error.
    pub async fn smart(
        &self,
        chain: &str,
        role: EndpointRole,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<Fetched, UpstreamError> {
        let mut candidates = match self.chain_origins(chain, role) {
            Ok(origins) => origins,
            Err(RegistryError::NoEndpoints { chain, role }) => {
                warn!(%chain, %role, "no chain endpoints, using mirrors only");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        candidates.extend(self.mirrors.iter().cloned());
        fetch_with_failover(request, &candidates, cancel, &self.health).await
    }

    /// Primary mirror then secondary mirror.
    pub async fn plain(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<Fetched, UpstreamError> {
        fetch_with_failover(request, &self.mirrors, cancel, &self.health).await
    }

    /// Primary mirror only.
    pub async fn single(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<Fetched, UpstreamError> {
        fetch_with_failover(request, &self.mirrors[..1], cancel, &self.health).await
    }

    fn chain_origins(
        &self,
        chain: &str,
        role: EndpointRole,
    ) -> Result<Vec<Arc<dyn Origin>>, RegistryError> {
        let urls = self.registry.endpoints(chain, role)?;
        Ok(urls
            .into_iter()
            .map(|url| Arc::new(HttpOrigin::new(url, self.http.clone())) as Arc<dyn Origin>)
            .collect())
    }
}
