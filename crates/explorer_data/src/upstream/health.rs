//! Per-origin success/failure counters. Recorded on every attempt; ordering stays static.

use crate::upstream::error::AttemptError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct OriginHealth {
    pub successes: u64,
    pub failures: u64,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub origins: Vec<(String, OriginHealth)>,
}

impl HealthReport {
    pub fn get(&self, origin: &str) -> Option<&OriginHealth> {
        self.origins
            .iter()
            .find(|(label, _)| label == origin)
            .map(|(_, h)| h)
    }
}

#[derive(Default)]
pub struct HealthBook {
    origins: Mutex<HashMap<String, OriginHealth>>,
}

impl HealthBook {
    pub fn record_success(&self, origin: &str, elapsed: Duration) {
        let mut map = self.origins.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = map.entry(origin.to_string()).or_default();
        entry.successes += 1;
        entry.last_latency_ms = Some(elapsed.as_millis() as u64);
    }

    pub fn record_failure(&self, origin: &str, error: &AttemptError) {
        let mut map = self.origins.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = map.entry(origin.to_string()).or_default();
        entry.failures += 1;
        entry.last_error = Some(error.to_string());
    }

    pub fn report(&self) -> HealthReport {
        let map = self.origins.lock().unwrap_or_else(PoisonError::into_inner);
        let mut origins: Vec<_> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        origins.sort_by(|a, b| a.0.cmp(&b.0));
        HealthReport { origins }
    }
}
