//! Health check endpoints for Kubernetes probes

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::warn;

use super::state::AppState;
use crate::api::types::Json;

/// Probe body; `checks` and `latency_ms` are only present on `/ready`
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<HealthCheck>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    fn status_code(self) -> StatusCode {
        match self {
            Self::Healthy => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
pub struct HealthCheck {
    pub name: &'static str,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

impl HealthCheck {
    fn from_result<T, E: std::fmt::Display>(
        name: &'static str,
        start: Instant,
        result: Result<T, E>,
    ) -> Self {
        let (status, message) = match result {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
        };

        Self {
            name,
            status,
            message,
            latency_ms: elapsed_ms(start),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Returns 200 while the process is serving
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION"),
        checks: None,
        latency_ms: None,
    })
}

/// 503 unless the approval store answers and at least one template is loaded
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let checks = vec![check_approval_store(&state).await, check_templates(&state)];

    let status = if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Healthy
    };

    for failed in checks.iter().filter(|c| c.status == HealthStatus::Unhealthy) {
        warn!(check = failed.name, message = ?failed.message, "Readiness check failed");
    }

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        checks: Some(checks),
        latency_ms: Some(elapsed_ms(start)),
    };

    (status.status_code(), Json(response))
}

pub async fn live_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn check_approval_store(state: &AppState) -> HealthCheck {
    let start = Instant::now();
    let result = state.approval_service.list(None).await;

    HealthCheck::from_result("storage", start, result)
}

fn check_templates(state: &AppState) -> HealthCheck {
    let start = Instant::now();
    let result = if state.workflow_service.list_templates().is_empty() {
        Err("No workflow templates loaded")
    } else {
        Ok(())
    };

    HealthCheck::from_result("workflow_templates", start, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn test_check_from_error() {
        let check = HealthCheck::from_result::<(), _>("storage", Instant::now(), Err("down"));

        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert_eq!(check.message.as_deref(), Some("down"));
        assert_eq!(check.status.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_liveness_body_omits_checks() {
        let body = serde_json::to_value(HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0",
            checks: None,
            latency_ms: None,
        })
        .unwrap();

        assert_eq!(body["status"], "healthy");
        assert!(body.get("checks").is_none());
    }
}
