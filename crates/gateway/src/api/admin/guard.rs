//! `AdminGuard` extractor for the `/admin` routes.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Json;

use crate::auth::{bearer_token, digest_matches};
use crate::state::AppState;

/// Requires `Authorization: Bearer <admin token>` when an admin token is
/// configured. With no token configured every request passes (dev mode).
pub struct AdminGuard;

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token_hash.as_deref() else {
            return Ok(AdminGuard);
        };

        let provided = bearer_token(&parts.headers).unwrap_or("");
        if !digest_matches(provided, expected) {
            tracing::warn!(path = %parts.uri.path(), "admin request rejected");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid admin token" })),
            ));
        }
        Ok(AdminGuard)
    }
}
