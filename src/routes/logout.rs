//! POST /auth/logout

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use std::sync::Arc;

use crate::audit::{ACTIVITY_LOGOFF, AuthEvent, STATUS_SUCCESS};
use crate::session::cookie::make_delete_cookie;
use crate::session::middleware::OidcSessionHandle;
use crate::types::SuccessResponse;

/// Invalidate the caller's session and clear its cookie.
pub async fn logout(
    State(state): State<Arc<crate::AppState>>,
    OidcSessionHandle(info): OidcSessionHandle,
) -> impl IntoResponse {
    let changed = state
        .store
        .invalidate_by_session_id_under_subject(info.sub(), info.session_id());
    tracing::debug!(sub = info.sub(), changed, "Local logout");

    AuthEvent::new(ACTIVITY_LOGOFF, STATUS_SUCCESS, "User logged out")
        .subject(Some(info.sub()))
        .session(info.session_id())
        .config_id(info.config_id())
        .emit();

    (
        [(header::SET_COOKIE, make_delete_cookie(state.config.session_https_only))],
        Json(SuccessResponse { success: true }),
    )
}
