use crate::config::AppState;
use crate::metrics::CounterSnapshot;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub cache: String,
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "ok" })
}

pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    // The cache is optional by design; "disabled" is still ready.
    let (cache_ok, cache_status) = match &state.cache_pool {
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => (true, "ok".to_string()),
            Err(e) => {
                tracing::error!("Readiness check: cache error: {}", e);
                (false, "error".to_string())
            }
        },
        None => (true, "disabled".to_string()),
    };

    let status_code = if cache_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: if cache_ok { "ready" } else { "unready" }.to_string(),
            cache: cache_status,
        }),
    )
}

pub async fn admin_counters(
    State(state): State<Arc<AppState>>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> (StatusCode, Json<serde_json::Value>) {
    // Local only.
    let ip = addr.ip();
    if !ip.is_loopback() {
        tracing::warn!("Blocked admin counters access attempt from {}", ip);
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        );
    }

    let snapshot: CounterSnapshot = state.counters.snapshot();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "counters": snapshot })),
    )
}
