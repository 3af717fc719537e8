use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use storytime_core::config::BotMode;
use storytime_db::LibraryRepository;

#[derive(Clone)]
pub struct HealthState {
    repo: Arc<dyn LibraryRepository>,
    mode: BotMode,
}

impl HealthState {
    pub fn new(repo: Arc<dyn LibraryRepository>, mode: BotMode) -> Self {
        Self { repo, mode }
    }
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
    pub database: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub mode: &'static str,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/", get(root)).route("/health", get(health)).with_state(state)
}

pub async fn root(State(state): State<HealthState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "storytime",
        version: env!("CARGO_PKG_VERSION"),
        mode: state.mode.as_str(),
    })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.repo.ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: "store query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("store query failed: {error}") }
        }
    };
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: format!("{} mode", state.mode.as_str()) },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
