//! Ordered failover across candidate origins.

use crate::upstream::error::{AttemptError, AttemptFailure, UpstreamError};
use crate::upstream::health::HealthBook;
use crate::upstream::origin::{BackendRequest, Origin};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Payload plus the origin that produced it. `failures` holds the candidates
/// tried (and failed) before it.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub payload: Value,
    pub origin: String,
    pub failures: Vec<AttemptFailure>,
}

/// Try `candidates` strictly in order, one attempt each, no delay between them.
///
/// Each attempt is bounded by `request.timeout`; dropping the attempt future on
/// timeout or cancellation aborts its in-flight request. The first success wins
/// and no later candidate is contacted. Cancelling `cancel` aborts the current
/// attempt and skips the rest.
pub async fn fetch_with_failover(
    request: &BackendRequest,
    candidates: &[Arc<dyn Origin>],
    cancel: &CancellationToken,
    health: &HealthBook,
) -> Result<Fetched, UpstreamError> {
    if candidates.is_empty() {
        return Err(UpstreamError::NoCandidates(request.path.clone()));
    }

    let mut failures = Vec::with_capacity(candidates.len());
    for (attempt, origin) in candidates.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(origin = %origin.label(), path = %request.path, "attempt cancelled");
                return Err(UpstreamError::Cancelled);
            }
            res = tokio::time::timeout(request.timeout, origin.issue(request)) => {
                res.unwrap_or(Err(AttemptError::Timeout(request.timeout)))
            }
        };

        match outcome {
            Ok(payload) => {
                let elapsed = started.elapsed();
                health.record_success(origin.label(), elapsed);
                if failures.is_empty() {
                    debug!(
                        origin = %origin.label(),
                        path = %request.path,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "fetched"
                    );
                } else {
                    info!(
                        origin = %origin.label(),
                        path = %request.path,
                        failed = failures.len(),
                        "fetched after failover"
                    );
                }
                return Ok(Fetched {
                    payload,
                    origin: origin.label().to_string(),
                    failures,
                });
            }
            Err(error) => {
                warn!(
                    origin = %origin.label(),
                    path = %request.path,
                    attempt,
                    error = %error,
                    "candidate failed"
                );
                health.record_failure(origin.label(), &error);
                failures.push(AttemptFailure {
                    origin: origin.label().to_string(),
                    error,
                });
            }
        }
    }

    Err(UpstreamError::Unavailable {
        path: request.path.clone(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum Behavior {
        Ok(Value),
        Fail,
        Hang,
    }

    struct Scripted {
        label: String,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(label: &str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                label: label.to_string(),
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Origin for Scripted {
        fn label(&self) -> &str {
            &self.label
        }

        async fn issue(&self, _request: &BackendRequest) -> Result<Value, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Ok(v) => Ok(v.clone()),
                Behavior::Fail => Err(AttemptError::Network("connection refused".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Value::Null)
                }
            }
        }
    }

    fn as_origins(list: &[Arc<Scripted>]) -> Vec<Arc<dyn Origin>> {
        list.iter().map(|o| o.clone() as Arc<dyn Origin>).collect()
    }

    #[tokio::test]
    async fn third_candidate_wins_and_nothing_after_is_called() {
        let a = Scripted::new("a", Behavior::Fail);
        let b = Scripted::new("b", Behavior::Fail);
        let c = Scripted::new("c", Behavior::Ok(json!({"from": "c"})));
        let d = Scripted::new("d", Behavior::Ok(json!({"from": "d"})));
        let all = [a.clone(), b.clone(), c.clone(), d.clone()];
        let health = HealthBook::default();
        let fetched = fetch_with_failover(
            &BackendRequest::get("/x"),
            &as_origins(&all),
            &CancellationToken::new(),
            &health,
        )
        .await
        .unwrap();
        assert_eq!(fetched.payload, json!({"from": "c"}));
        assert_eq!(fetched.origin, "c");
        assert_eq!(fetched.failures.len(), 2);
        assert_eq!(d.calls(), 0);
        assert_eq!(health.report().get("a").unwrap().failures, 1);
        assert_eq!(health.report().get("c").unwrap().successes, 1);
    }

    #[tokio::test]
    async fn all_fail_attempts_each_once() {
        let list = [
            Scripted::new("a", Behavior::Fail),
            Scripted::new("b", Behavior::Fail),
            Scripted::new("c", Behavior::Fail),
        ];
        let err = fetch_with_failover(
            &BackendRequest::get("/x"),
            &as_origins(&list),
            &CancellationToken::new(),
            &HealthBook::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(err.attempts(), 3);
        for o in &list {
            assert_eq!(o.calls(), 1);
        }
    }

    #[tokio::test]
    async fn timeout_moves_to_next_candidate() {
        let slow = Scripted::new("slow", Behavior::Hang);
        let fast = Scripted::new("fast", Behavior::Ok(json!(1)));
        let req = BackendRequest::get("/x").timeout(Duration::from_millis(50));
        let fetched = fetch_with_failover(
            &req,
            &as_origins(&[slow, fast]),
            &CancellationToken::new(),
            &HealthBook::default(),
        )
        .await
        .unwrap();
        assert_eq!(fetched.origin, "fast");
        assert!(matches!(
            fetched.failures[0].error,
            AttemptError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_candidates() {
        let slow = Scripted::new("slow", Behavior::Hang);
        let next = Scripted::new("next", Behavior::Ok(json!(1)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = fetch_with_failover(
            &BackendRequest::get("/x"),
            &as_origins(&[slow, next.clone()]),
            &cancel,
            &HealthBook::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UpstreamError::Cancelled));
        assert_eq!(next.calls(), 0);
    }

    #[tokio::test]
    async fn empty_candidate_list() {
        let err = fetch_with_failover(
            &BackendRequest::get("/x"),
            &[],
            &CancellationToken::new(),
            &HealthBook::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UpstreamError::NoCandidates(_)));
    }
}
