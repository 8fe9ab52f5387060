use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

use super::guard::AdminGuard;

/// POST /admin/shutdown: request a graceful shutdown.
///
/// Responds immediately; the server drains and exits in the background.
pub async fn shutdown(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    tracing::info!("shutdown requested via admin API");
    state.shutdown_tx.notify_one();
    Json(serde_json::json!({ "status": "shutting_down" }))
}
