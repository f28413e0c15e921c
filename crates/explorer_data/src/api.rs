//! Explorer API routes built on the route wrapper.
//!
//! | route        | params                           | backend                    | cache      |
//! |--------------|----------------------------------|----------------------------|------------|
//! | `network`    | `chain`                          | smart (chain api, mirrors) | 10s / 30s  |
//! | `validators` | `chain`, `status=bonded`         | plain (mirrors)            | 60s / 300s |
//! | `supply`     | `chain`                          | single (primary mirror)    | 30s / 120s |
//! | `holders`    | `address=""`, `limit=100`        | holder snapshot            | none       |
//!
//! `network` degrades to zeroed stats when every origin is down. The zeroed
//! body is served uncached and never replaces a cached one.

use crate::chain::EndpointRole;
use crate::config::CachePolicy;
use crate::holders::SnapshotStore;
use crate::route::{
    create_route, degrade_unavailable, CacheHandle, ContractError, Params, Route, RouteContract,
    RouteError,
};
use crate::upstream::BackendClient;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_HOLDER_LIMIT: usize = 1_000;
const VALIDATOR_STATUSES: [&str; 4] = ["bonded", "unbonded", "unbonding", "all"];

pub struct ApiRoutes {
    routes: Vec<Route>,
}

impl ApiRoutes {
    pub fn new(
        client: Arc<BackendClient>,
        snapshots: Arc<SnapshotStore>,
        cache: CacheHandle,
    ) -> Result<Self, ContractError> {
        Ok(Self {
            routes: vec![
                network_route(Arc::clone(&client), cache.clone())?,
                validators_route(Arc::clone(&client), cache.clone())?,
                supply_route(client, cache.clone())?,
                holders_route(snapshots, cache)?,
            ],
        })
    }

    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(Route::name)
    }
}

pub fn zeroed_network_stats(chain: &str) -> Value {
    json!({
        "chain": chain,
        "height": 0,
        "bonded_tokens": "0",
        "total_validators": 0,
        "active_validators": 0,
        "inflation": "0",
        "degraded": true,
    })
}

pub fn network_route(
    client: Arc<BackendClient>,
    cache: CacheHandle,
) -> Result<Route, ContractError> {
    let contract = RouteContract::new()
        .required("chain")
        .cached(CachePolicy::from_millis(10_000, 30_000));
    create_route("network", contract, cache, move |params: Params| {
        let client = Arc::clone(&client);
        async move {
            let chain = params.require("chain")?.to_string();
            let request = client.request("/api/network").query("chain", chain.as_str());
            let result = client
                .smart(&chain, EndpointRole::Api, &request, params.cancel())
                .await;
            degrade_unavailable(result, zeroed_network_stats(&chain))
        }
    })
}

pub fn validators_route(
    client: Arc<BackendClient>,
    cache: CacheHandle,
) -> Result<Route, ContractError> {
    let contract = RouteContract::new()
        .required("chain")
        .optional("status", "bonded")
        .cached(CachePolicy::from_millis(60_000, 300_000));
    create_route("validators", contract, cache, move |params: Params| {
        let client = Arc::clone(&client);
        async move {
            let chain = params.require("chain")?;
            let status = params.require("status")?;
            if !VALIDATOR_STATUSES.contains(&status) {
                return Err(RouteError::InvalidParameter {
                    name: "status".to_string(),
                    reason: format!("expected one of {}", VALIDATOR_STATUSES.join(", ")),
                });
            }
            let request = client
                .request("/api/validators")
                .query("chain", chain)
                .query("status", status);
            Ok::<_, RouteError>(client.plain(&request, params.cancel()).await?.payload)
        }
    })
}

pub fn supply_route(
    client: Arc<BackendClient>,
    cache: CacheHandle,
) -> Result<Route, ContractError> {
    let contract = RouteContract::new()
        .required("chain")
        .cached(CachePolicy::from_millis(30_000, 120_000));
    create_route("supply", contract, cache, move |params: Params| {
        let client = Arc::clone(&client);
        async move {
            let request = client
                .request("/api/supply")
                .query("chain", params.require("chain")?);
            Ok::<_, RouteError>(client.single(&request, params.cancel()).await?.payload)
        }
    })
}

/// Served from the in-memory snapshot; already cheap, so not cached.
pub fn holders_route(
    snapshots: Arc<SnapshotStore>,
    cache: CacheHandle,
) -> Result<Route, ContractError> {
    let contract = RouteContract::new()
        .optional("address", "")
        .optional("limit", "100");
    create_route("holders", contract, cache, move |params: Params| {
        let snapshots = Arc::clone(&snapshots);
        async move {
            let snapshot = snapshots.require()?;
            let summary = serde_json::to_value(snapshot.summary())
                .map_err(|e| RouteError::Handler(e.to_string()))?;

            if let Some(address) = params.get("address").filter(|a| !a.is_empty()) {
                let holder = snapshot
                    .find_by_key(address)
                    .ok_or_else(|| RouteError::NotFound(format!("holder {address}")))?;
                return Ok(json!({ "summary": summary, "holder": holder }));
            }

            let limit: usize = params.parse("limit")?;
            if limit == 0 || limit > MAX_HOLDER_LIMIT {
                return Err(RouteError::InvalidParameter {
                    name: "limit".to_string(),
                    reason: format!("must be between 1 and {MAX_HOLDER_LIMIT}"),
                });
            }
            Ok::<_, RouteError>(json!({ "summary": summary, "holders": snapshot.top_n(limit) }))
        }
    })
}
