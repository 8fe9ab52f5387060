use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::sessions::SessionInfo;
use crate::state::AppState;

use super::guard::AdminGuard;

/// GET /admin/sessions: currently active sessions.
pub async fn list_sessions(
    _guard: AdminGuard,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let mut sessions: Vec<SessionInfo> = state
        .sessions
        .active_sessions()
        .iter()
        .map(SessionInfo::from)
        .collect();
    sessions.sort_by_key(|s| s.connected_at);

    Json(serde_json::json!({
        "total_sessions": sessions.len(),
        "sessions": sessions,
    }))
}
