//! Origin abstraction and the HTTP implementation used for chain nodes and mirrors.

use crate::config::{BackendConfig, DEFAULT_TIMEOUT_MS};
use crate::upstream::error::{AttemptError, UpstreamError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const MAX_ERROR_BODY: usize = 256;

/// One logical request, immutable across attempts.
#[derive(Clone, Debug)]
pub struct BackendRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl BackendRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Anything that can answer a [`BackendRequest`] with a JSON document.
#[async_trait]
pub trait Origin: Send + Sync {
    fn label(&self) -> &str;

    async fn issue(&self, request: &BackendRequest) -> Result<Value, AttemptError>;
}

pub fn build_http_client(config: &BackendConfig) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.timeout())
        .build()
        .map_err(|e| UpstreamError::Client(e.to_string()))
}

pub struct HttpOrigin {
    base: Url,
    label: String,
    client: reqwest::Client,
}

impl HttpOrigin {
    pub fn new(base: Url, client: reqwest::Client) -> Self {
        let label = base.as_str().trim_end_matches('/').to_string();
        Self {
            base,
            label,
            client,
        }
    }

    fn url_for(&self, request: &BackendRequest) -> Result<Url, AttemptError> {
        let raw = format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        let mut url = Url::parse(&raw).map_err(|e| AttemptError::InvalidUrl(e.to_string()))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    fn label(&self) -> &str {
        &self.label
    }

    async fn issue(&self, request: &BackendRequest) -> Result<Value, AttemptError> {
        let url = self.url_for(request)?;
        let mut builder = self.client.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: clip(body, MAX_ERROR_BODY),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);
        if let Some(ct) = content_type {
            if !ct.contains("json") {
                return Err(AttemptError::Malformed(format!("content-type {ct}")));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| AttemptError::Malformed(e.to_string()))
    }
}

/// Cut `body` to at most `max` bytes without splitting a character.
fn clip(mut body: String, max: usize) -> String {
    if body.len() > max {
        let cut = (0..=max)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::failover::fetch_with_failover;
    use crate::upstream::health::HealthBook;
    use mockito::Server;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn origin(url: &str) -> HttpOrigin {
        let client = build_http_client(&BackendConfig::default()).unwrap();
        HttpOrigin::new(Url::parse(url).unwrap(), client)
    }

    #[test]
    fn url_joins_base_path_and_query() {
        let o = origin("https://mirror.example/v1/");
        let req = BackendRequest::get("/api/network").query("chain", "demo 1");
        let url = o.url_for(&req).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mirror.example/v1/api/network?chain=demo+1"
        );
        assert_eq!(o.label(), "https://mirror.example/v1");
    }

    #[tokio::test]
    async fn issue_parses_json() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/network")
            .match_header("x-test", "1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"height":42}"#)
            .create_async()
            .await;
        let o = origin(&server.url());
        let req = BackendRequest::get("/api/network").header("x-test", "1");
        let v = o.issue(&req).await.unwrap();
        assert_eq!(v["height"], 42);
    }

    #[tokio::test]
    async fn html_body_is_malformed() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/network")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;
        let err = origin(&server.url())
            .issue(&BackendRequest::get("/api/network"))
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::Malformed(_)));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/network")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;
        let err = origin(&server.url())
            .issue(&BackendRequest::get("/api/network"))
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::Status { status: 502, .. }));
    }

    #[test]
    fn request_timeout_defaults_to_backend_timeout() {
        assert_eq!(
            BackendRequest::get("/x").timeout,
            BackendConfig::default().timeout()
        );
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let body = format!("{}é", "a".repeat(255));
        assert_eq!(clip(body, 256), "a".repeat(255));
        assert_eq!(clip("short".to_string(), 256), "short");
        assert_eq!(clip("éé".to_string(), 3), "é");
        assert_eq!(clip("é".to_string(), 1), "");
    }

    #[tokio::test]
    async fn multibyte_error_body_still_fails_over() {
        let mut broken = Server::new_async().await;
        let mut healthy = Server::new_async().await;
        let _b = broken
            .mock("GET", "/api/network")
            .with_status(500)
            .with_body(format!("{}é tail", "a".repeat(255)))
            .create_async()
            .await;
        let _h = healthy
            .mock("GET", "/api/network")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"height":7}"#)
            .create_async()
            .await;
        let candidates: Vec<Arc<dyn Origin>> = vec![
            Arc::new(origin(&broken.url())),
            Arc::new(origin(&healthy.url())),
        ];
        let fetched = fetch_with_failover(
            &BackendRequest::get("/api/network"),
            &candidates,
            &CancellationToken::new(),
            &HealthBook::default(),
        )
        .await
        .unwrap();
        assert_eq!(fetched.payload["height"], 7);
        match &fetched.failures[0].error {
            AttemptError::Status { status, body } => {
                assert_eq!(*status, 500);
                assert_eq!(body, &"a".repeat(255));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
