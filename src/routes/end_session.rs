//! Provider logout endpoints: any `…/{provider_id}/end_session` or
//! `…/{provider_id}/logout` path, served from the router fallback.

use axum::Form;
use axum::Json;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::Uri;
use std::sync::Arc;

use crate::error::AppError;
use crate::logout::LogoutRequest;
use crate::session::middleware::OidcSessionHandle;
use crate::types::{EndSessionResponse, LogoutHint};

/// Notify the relying parties of the provider the path names.
///
/// `id_token_hint` comes from the query string (GET) or the form body (POST).
/// Without a usable hint, the caller's own session supplies the subject.
pub async fn end_session(
    State(state): State<Arc<crate::AppState>>,
    uri: Uri,
    session: Option<OidcSessionHandle>,
    hint: Result<Form<LogoutHint>, FormRejection>,
) -> Result<Json<EndSessionResponse>, AppError> {
    let hint = hint.map(|Form(h)| h).unwrap_or_default();
    let principal = session.as_ref().map(|OidcSessionHandle(info)| info.sub());

    let request = LogoutRequest {
        path: uri.path(),
        id_token_hint: hint.id_token_hint.as_deref().filter(|h| !h.is_empty()),
        principal,
    };
    let outcome = state.dispatcher.logout(&request).await.ok_or(AppError::NotFound)?;

    Ok(Json(EndSessionResponse {
        provider_matched: true,
        delivered: outcome.delivered,
        failed: outcome.failed,
    }))
}
