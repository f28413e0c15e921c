use crate::chain::RegistryError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why one candidate failed. Never fatal on its own.
#[derive(Error, Debug, Clone)]
pub enum AttemptError {
    #[error("network: {0}")]
    Network(String),
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub origin: String,
    pub error: AttemptError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.error)
    }
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream unavailable for {path}: {}", summarize(.failures))]
    Unavailable {
        path: String,
        failures: Vec<AttemptFailure>,
    },
    #[error("request cancelled")]
    Cancelled,
    #[error("no candidate origins for {0}")]
    NoCandidates(String),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("http client: {0}")]
    Client(String),
}

impl UpstreamError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Number of attempts made before giving up, if the candidates were exhausted.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Unavailable { failures, .. } => failures.len(),
            _ => 0,
        }
    }
}

fn summarize(failures: &[AttemptFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
