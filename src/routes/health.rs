use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.uptime_secs(),
        "activeSessions": state.sessions().len().await,
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// 会话表已满时不再接收新会话
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions().len().await;
    let capacity = state.sessions().max_sessions();
    let status = if sessions < capacity {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "ready": status == StatusCode::OK,
            "sessions": sessions,
            "capacity": capacity,
            "exportEnabled": state.exporter().is_some(),
        })),
    )
}
