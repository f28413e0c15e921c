//! Route contracts: declared parameters, defaults, cache policy.

use crate::config::CachePolicy;
use crate::route::error::RouteError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContractError {
    #[error("parameter {0} is both required and optional")]
    Overlap(String),
    #[error("parameter {0} declared twice")]
    Duplicate(String),
}

#[derive(Clone, Debug, Default)]
pub struct RouteContract {
    required: Vec<String>,
    optional: Vec<(String, String)>,
    cache: Option<CachePolicy>,
}

impl RouteContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn optional(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.optional.push((name.into(), default.into()));
        self
    }

    pub fn cached(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.cache
    }

    pub(crate) fn validate(&self) -> Result<(), ContractError> {
        let mut seen = std::collections::HashSet::new();
        for name in &self.required {
            if !seen.insert(name.as_str()) {
                return Err(ContractError::Duplicate(name.clone()));
            }
        }
        for (name, _) in &self.optional {
            if self.required.contains(name) {
                return Err(ContractError::Overlap(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ContractError::Duplicate(name.clone()));
            }
        }
        Ok(())
    }

    /// Check required parameters and fill defaults. Undeclared query keys are dropped.
    pub fn resolve(&self, query: &HashMap<String, String>) -> Result<Params, RouteError> {
        let mut values = BTreeMap::new();
        for name in &self.required {
            match query.get(name).map(|v| v.trim()) {
                Some(v) if !v.is_empty() => {
                    values.insert(name.clone(), v.to_string());
                }
                _ => return Err(RouteError::MissingParameter(name.clone())),
            }
        }
        for (name, default) in &self.optional {
            let value = query
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(default.as_str());
            values.insert(name.clone(), value.to_string());
        }
        Ok(Params {
            values,
            cancel: CancellationToken::new(),
        })
    }
}

/// Resolved parameters handed to a handler (declared names only, defaults applied).
#[derive(Clone, Debug, Serialize)]
pub struct Params {
    values: BTreeMap<String, String>,
    #[serde(skip)]
    cancel: CancellationToken,
}

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, RouteError> {
        self.get(name)
            .ok_or_else(|| RouteError::MissingParameter(name.to_string()))
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, RouteError>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.require(name)?;
        raw.parse::<T>().map_err(|e| RouteError::InvalidParameter {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Cancelled when the caller gives up on the request.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// `<route>:<sha256 of the sorted (name, value) pairs as canonical JSON>`.
pub fn cache_key(route: &str, params: &Params) -> String {
    // BTreeMap serializes in key order, so the JSON is canonical.
    let canonical = serde_json::to_string(&params.values).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{route}:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn contract() -> RouteContract {
        RouteContract::new()
            .required("chain")
            .optional("status", "bonded")
    }

    #[test]
    fn overlap_and_duplicates_rejected() {
        let c = RouteContract::new().required("a").optional("a", "1");
        assert_eq!(c.validate(), Err(ContractError::Overlap("a".into())));
        let c = RouteContract::new().required("a").required("a");
        assert_eq!(c.validate(), Err(ContractError::Duplicate("a".into())));
        assert!(contract().validate().is_ok());
    }

    #[test]
    fn missing_or_blank_required_is_rejected() {
        let c = contract();
        for q in [query(&[]), query(&[("chain", "  ")])] {
            match c.resolve(&q) {
                Err(RouteError::MissingParameter(name)) => assert_eq!(name, "chain"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn defaults_fill_and_extras_drop() {
        let p = contract()
            .resolve(&query(&[("chain", "demo-1"), ("junk", "x")]))
            .unwrap();
        assert_eq!(p.get("status"), Some("bonded"));
        assert_eq!(p.get("junk"), None);
        assert_eq!(p.iter().count(), 2);
    }

    #[test]
    fn key_uses_post_default_values() {
        let c = contract();
        let omitted = c.resolve(&query(&[("chain", "demo-1")])).unwrap();
        let explicit = c
            .resolve(&query(&[("chain", "demo-1"), ("status", "bonded")]))
            .unwrap();
        let other = c
            .resolve(&query(&[("chain", "demo-1"), ("status", "jailed")]))
            .unwrap();
        assert_eq!(cache_key("validators", &omitted), cache_key("validators", &explicit));
        assert_ne!(cache_key("validators", &omitted), cache_key("validators", &other));
        assert_ne!(cache_key("validators", &omitted), cache_key("network", &omitted));
        assert!(cache_key("validators", &omitted).starts_with("validators:"));
    }

    #[test]
    fn parse_reports_invalid_values() {
        let c = RouteContract::new().optional("limit", "100");
        let p = c.resolve(&query(&[("limit", "ten")])).unwrap();
        assert!(matches!(
            p.parse::<usize>("limit"),
            Err(RouteError::InvalidParameter { .. })
        ));
        let p = c.resolve(&query(&[])).unwrap();
        assert_eq!(p.parse::<usize>("limit").unwrap(), 100);
    }
}
