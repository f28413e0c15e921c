use crate::chain::RegistryError;
use crate::holders::SnapshotError;
use crate::upstream::{Fetched, UpstreamError};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("{0}")]
    Handler(String),
    /// A documented fallback body. Served with 200 but never cached, and a
    /// background refresh ending here keeps the previous entry.
    #[error("upstream unavailable, serving degraded payload")]
    Degraded(Value),
}

impl RouteError {
    /// HTTP status for the error envelope.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingParameter(_) | Self::InvalidParameter { .. } => 400,
            Self::NotFound(_) => 404,
            Self::Upstream(UpstreamError::Registry(RegistryError::ChainNotFound(_))) => 404,
            Self::Upstream(UpstreamError::Cancelled) => 499,
            Self::Upstream(UpstreamError::Client(_)) => 500,
            Self::Upstream(_) => 502,
            Self::Snapshot(SnapshotError::NotLoaded) => 503,
            Self::Snapshot(SnapshotError::Upstream(_)) => 502,
            Self::Snapshot(SnapshotError::Malformed(_)) => 502,
            Self::Handler(_) => 500,
            Self::Degraded(_) => 200,
        }
    }

    /// `{"error": message}`.
    pub fn envelope(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// Turn an exhausted upstream into [`RouteError::Degraded`] carrying `default`.
/// Any other error still propagates.
pub fn degrade_unavailable(
    result: Result<Fetched, UpstreamError>,
    default: Value,
) -> Result<Value, RouteError> {
    match result {
        Ok(fetched) => Ok(fetched.payload),
        Err(e @ UpstreamError::Unavailable { .. }) => {
            warn!(error = %e, "upstream unavailable, degrading");
            Err(RouteError::Degraded(default))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(RouteError::MissingParameter("chain".into()).status(), 400);
        assert_eq!(
            RouteError::from(UpstreamError::Registry(RegistryError::ChainNotFound(
                "x".into()
            )))
            .status(),
            404
        );
        assert_eq!(
            RouteError::from(UpstreamError::Unavailable {
                path: "/p".into(),
                failures: vec![]
            })
            .status(),
            502
        );
        assert_eq!(RouteError::from(SnapshotError::NotLoaded).status(), 503);
    }

    #[test]
    fn envelope_carries_message() {
        let e = RouteError::MissingParameter("chain".into());
        assert_eq!(
            e.envelope(),
            json!({"error": "missing required parameter: chain"})
        );
    }

    #[test]
    fn degrade_only_swallows_unavailable() {
        let unavailable = UpstreamError::Unavailable {
            path: "/x".into(),
            failures: vec![],
        };
        match degrade_unavailable(Err(unavailable), json!({"height": 0})) {
            Err(RouteError::Degraded(body)) => assert_eq!(body, json!({"height": 0})),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            degrade_unavailable(Err(UpstreamError::Cancelled), json!(0)),
            Err(RouteError::Upstream(UpstreamError::Cancelled))
        ));
        let ok = Fetched {
            payload: json!(5),
            origin: "a".into(),
            failures: vec![],
        };
        assert_eq!(degrade_unavailable(Ok(ok), json!(0)).unwrap(), json!(5));
    }
}
