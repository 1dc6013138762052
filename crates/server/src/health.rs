use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use minion_agent::AgentRuntime;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub registry: HealthCheck,
    pub active_sessions: usize,
    pub checked_at: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { runtime })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let registry = state.runtime.registry();
    let registry_check = if registry.is_empty() {
        HealthCheck { status: "degraded", detail: "no agents registered".to_string() }
    } else {
        HealthCheck {
            status: "ready",
            detail: format!(
                "{} agents registered, fallback `{}`",
                registry.len(),
                registry.fallback().id()
            ),
        }
    };
    let ready = registry_check.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "minion-server runtime initialized".to_string(),
        },
        registry: registry_check,
        active_sessions: state.runtime.sessions().len().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
