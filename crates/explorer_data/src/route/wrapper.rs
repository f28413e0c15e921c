//! Route wrapper: parameter validation, cache lookup/population, error envelope.

use crate::cache::{spawn_revalidation, Clock, Freshness, InflightSet, SwrCache};
use crate::config::{CacheConfig, CachePolicy};
use crate::route::contract::{cache_key, ContractError, Params, RouteContract};
use crate::route::error::RouteError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Cached route bodies are shared, never mutated.
pub type Payload = Arc<Value>;

#[async_trait]
pub trait RouteHandler: Send + Sync + 'static {
    async fn handle(&self, params: Params) -> Result<Value, RouteError>;
}

#[async_trait]
impl<F, Fut> RouteHandler for F
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RouteError>> + Send + 'static,
{
    async fn handle(&self, params: Params) -> Result<Value, RouteError> {
        (self)(params).await
    }
}

/// Shared cache state threaded through every route.
#[derive(Clone)]
pub struct CacheHandle {
    pub cache: Arc<SwrCache<Payload>>,
    pub inflight: Arc<InflightSet>,
}

impl CacheHandle {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: Arc::new(SwrCache::new(config)),
            inflight: InflightSet::new(),
        }
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: Arc::new(SwrCache::with_clock(config, clock)),
            inflight: InflightSet::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Stale,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Stale => "STALE",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouteResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Payload,
}

impl RouteResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Aborts the handler task when the request future is dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Route {
    name: String,
    contract: RouteContract,
    handler: Arc<dyn RouteHandler>,
    cache: CacheHandle,
}

/// Wrap `handler` with `contract`. Fails if the contract declares a name twice.
pub fn create_route(
    name: impl Into<String>,
    contract: RouteContract,
    cache: CacheHandle,
    handler: impl RouteHandler,
) -> Result<Route, ContractError> {
    contract.validate()?;
    Ok(Route {
        name: name.into(),
        contract,
        handler: Arc::new(handler),
        cache,
    })
}

impl Route {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contract(&self) -> &RouteContract {
        &self.contract
    }

    pub async fn handle(&self, query: &HashMap<String, String>) -> RouteResponse {
        self.handle_with_cancel(query, CancellationToken::new())
            .await
    }

    /// Parse a raw `a=1&b=2` query string, then handle.
    pub async fn handle_query_string(&self, query: &str) -> RouteResponse {
        let parsed: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        self.handle(&parsed).await
    }

    /// `cancel` reaches the handler through [`Params::cancel`].
    pub async fn handle_with_cancel(
        &self,
        query: &HashMap<String, String>,
        cancel: CancellationToken,
    ) -> RouteResponse {
        let params = match self.contract.resolve(query) {
            Ok(p) => p.with_cancel(cancel),
            Err(e) => return self.error_response(e),
        };

        let Some(policy) = self.contract.cache_policy() else {
            return match self.invoke(params).await {
                Ok(body) => self.respond(Arc::new(body), CacheStatus::Bypass, None),
                Err(e) => self.error_response(e),
            };
        };

        let key = cache_key(&self.name, &params);
        if let Some(read) = self.cache.cache.lookup(&key, &policy) {
            let status = match read.freshness {
                Freshness::Fresh => CacheStatus::Hit,
                Freshness::Stale => {
                    self.revalidate(&key, policy, params);
                    CacheStatus::Stale
                }
            };
            debug!(route = %self.name, key = %key, status = status.as_str(), "cache read");
            return self.respond(read.value, status, Some(policy));
        }

        debug!(route = %self.name, key = %key, "cache miss");
        match self.invoke(params).await {
            Ok(body) => {
                let body = Arc::new(body);
                self.cache.cache.set(&key, Arc::clone(&body), policy);
                self.respond(body, CacheStatus::Miss, Some(policy))
            }
            Err(e) => self.error_response(e),
        }
    }

    /// Run the handler on its own task so a panic becomes a 500 instead of unwinding.
    async fn invoke(&self, params: Params) -> Result<Value, RouteError> {
        let handler = Arc::clone(&self.handler);
        let mut task = AbortOnDrop(tokio::spawn(async move { handler.handle(params).await }));
        match (&mut task.0).await {
            Ok(result) => result,
            Err(join) => {
                error!(route = %self.name, error = %join, "handler task failed");
                Err(RouteError::Handler("internal error".to_string()))
            }
        }
    }

    fn revalidate(&self, key: &str, policy: CachePolicy, params: Params) {
        let handler = Arc::clone(&self.handler);
        // Detached from the triggering request, so it gets its own token.
        let params = params.with_cancel(CancellationToken::new());
        spawn_revalidation(
            Arc::clone(&self.cache.cache),
            &self.cache.inflight,
            key,
            policy,
            async move { handler.handle(params).await.map(Arc::new) },
        );
    }

    fn respond(
        &self,
        body: Payload,
        status: CacheStatus,
        policy: Option<CachePolicy>,
    ) -> RouteResponse {
        let cache_control = policy
            .map(|p| p.cache_control())
            .unwrap_or_else(|| "no-store".to_string());
        RouteResponse {
            status: 200,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("cache-control".to_string(), cache_control),
                ("x-cache".to_string(), status.as_str().to_string()),
            ],
            body,
        }
    }

    fn error_response(&self, e: RouteError) -> RouteResponse {
        if let RouteError::Degraded(body) = e {
            warn!(route = %self.name, "serving degraded payload");
            return self.respond(Arc::new(body), CacheStatus::Bypass, None);
        }
        let status = e.status();
        if status >= 500 {
            warn!(route = %self.name, status, error = %e, "route failed");
        } else {
            debug!(route = %self.name, status, error = %e, "route rejected");
        }
        RouteResponse {
            status,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("cache-control".to_string(), "no-store".to_string()),
            ],
            body: Arc::new(e.envelope()),
        }
    }
}
