//! Liveness handler

use crate::{Response, ResponseBuilder, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Shutting down; in-flight requests still complete
    Draining,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Draining => "draining",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Draining => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health handler. Clones share the same ready flag.
#[derive(Debug, Clone)]
pub struct Health {
    ready: Arc<AtomicBool>,
}

impl Health {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn status(&self) -> HealthStatus {
        if self.ready.load(Ordering::SeqCst) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Draining
        }
    }

    pub fn respond(&self) -> Response {
        let status = self.status();
        ResponseBuilder::new(status.status_code())
            .header("content-type", "application/json")
            .header("cache-control", "no-cache, no-store")
            .body(serde_json::json!({ "status": status.as_str() }).to_string())
            .build()
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}
