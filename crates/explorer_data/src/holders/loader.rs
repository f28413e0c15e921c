//! Full snapshot rebuild from the mirrors.

use crate::holders::snapshot::HolderSnapshot;
use crate::holders::SnapshotError;
use crate::upstream::BackendClient;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DEFAULT_HOLDERS_PATH: &str = "/api/holders";
const DEFAULT_PAGE_SIZE: usize = 1_000;
const DEFAULT_MAX_HOLDERS: usize = 5_000_000;

/// Produces a complete snapshot. Expensive; called out of band.
#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    async fn rebuild(&self, cancel: &CancellationToken) -> Result<HolderSnapshot, SnapshotError>;
}

/// Pages through `/api/holders?chain=..&offset=..&limit=..` on the mirrors
/// (plain failover) until a short page.
///
/// Each page is `{"total_supply": amount, "holders": [{"address": .., "balance": amount}]}`
/// where an amount is a JSON integer or a decimal string. A full page that
/// adds no new address, or more than `max_holders` rows, fails the rebuild.
pub struct MirrorHolderLoader {
    client: Arc<BackendClient>,
    chain: String,
    path: String,
    page_size: usize,
    max_holders: usize,
}

impl MirrorHolderLoader {
    pub fn new(client: Arc<BackendClient>, chain: impl Into<String>) -> Self {
        Self {
            client,
            chain: chain.into(),
            path: DEFAULT_HOLDERS_PATH.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_holders: DEFAULT_MAX_HOLDERS,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_holders(mut self, max_holders: usize) -> Self {
        self.max_holders = max_holders.max(1);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

#[async_trait]
impl SnapshotLoader for MirrorHolderLoader {
    async fn rebuild(&self, cancel: &CancellationToken) -> Result<HolderSnapshot, SnapshotError> {
        let mut balances = Vec::new();
        let mut seen = HashSet::new();
        let mut total_supply = None;
        let mut offset = 0usize;
        loop {
            let request = self
                .client
                .request(self.path.clone())
                .query("chain", self.chain.clone())
                .query("offset", offset.to_string())
                .query("limit", self.page_size.to_string());
            let page = self.client.plain(&request, cancel).await?.payload;
            if total_supply.is_none() {
                total_supply = page.get("total_supply").map(parse_amount).transpose()?;
            }
            let rows = page
                .get("holders")
                .and_then(Value::as_array)
                .ok_or_else(|| SnapshotError::Malformed("missing holders array".to_string()))?;
            let mut fresh = 0usize;
            for row in rows {
                let (address, balance) = parse_row(row)?;
                if seen.insert(address.clone()) {
                    fresh += 1;
                }
                balances.push((address, balance));
            }
            debug!(chain = %self.chain, offset, rows = rows.len(), fresh, "holder page");
            if rows.len() < self.page_size {
                break;
            }
            // A full page with nothing new means the mirror is ignoring `offset`.
            if fresh == 0 {
                return Err(SnapshotError::Malformed(format!(
                    "page at offset {offset} repeats earlier holders"
                )));
            }
            if balances.len() >= self.max_holders {
                return Err(SnapshotError::Malformed(format!(
                    "more than {} holder rows",
                    self.max_holders
                )));
            }
            offset += rows.len();
        }

        let total_supply = total_supply.unwrap_or_else(|| {
            balances
                .iter()
                .fold(0u128, |acc, (_, b)| acc.saturating_add(*b))
        });
        let snapshot = HolderSnapshot::build(balances, total_supply, OffsetDateTime::now_utc());
        info!(chain = %self.chain, holders = snapshot.len(), "holder snapshot rebuilt");
        Ok(snapshot)
    }
}

fn parse_row(row: &Value) -> Result<(String, u128), SnapshotError> {
    let address = row
        .get("address")
        .and_then(Value::as_str)
        .ok_or_else(|| SnapshotError::Malformed(format!("holder without address: {row}")))?;
    let balance = row
        .get("balance")
        .ok_or_else(|| SnapshotError::Malformed(format!("holder without balance: {address}")))
        .and_then(parse_amount)?;
    Ok((address.to_string(), balance))
}

pub(crate) fn parse_amount(v: &Value) -> Result<u128, SnapshotError> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(SnapshotError::Malformed(format!("amount: {other}"))),
    };
    text.parse::<u128>()
        .map_err(|_| SnapshotError::Malformed(format!("amount: {text}")))
}
