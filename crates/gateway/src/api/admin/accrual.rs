use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

use super::guard::AdminGuard;

/// POST /admin/accrual/run: run one accrual sweep now and wait for it.
pub async fn run_accrual(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    tracing::info!("manual accrual sweep requested");
    let report = state.accrual.run_sweep().await;
    Json(serde_json::json!({
        "message": "Manual accrual job triggered",
        "status": "success",
        "points_per_tick": state.accrual.points_per_tick(),
        "report": report,
    }))
}
