pub mod admin;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full HTTP router.
///
/// `/health` and `/ws` are public (the WebSocket authenticates its own
/// clients); everything under `/admin` is gated by [`admin::AdminGuard`].
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(crate::sessions::ws::session_ws))
        .route("/admin/accrual/run", post(admin::run_accrual))
        .route("/admin/sessions", get(admin::list_sessions))
        .route("/admin/shutdown", post(admin::shutdown))
}
