use axum::response::{IntoResponse, Json};
use chrono::Utc;

/// GET /health: lightweight liveness check (public, no auth).
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
