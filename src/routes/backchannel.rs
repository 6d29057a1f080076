//! POST /backchannel_logout/{config_id}

use axum::Form;
use axum::extract::rejection::FormRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use std::sync::Arc;

use crate::audit::{ACTIVITY_LOGOFF, AuthEvent, STATUS_FAILURE, STATUS_SUCCESS};
use crate::error::AppError;
use crate::logout::receiver::handle_logout_token;
use crate::types::BackchannelLogoutForm;

/// Accept a logout token from the provider and invalidate the sessions it
/// names. Every rejection is the same opaque 400.
pub async fn backchannel_logout(
    State(state): State<Arc<crate::AppState>>,
    Path(config_id): Path<String>,
    form: Result<Form<BackchannelLogoutForm>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Some(client) = state.clients.get(&config_id) else {
        tracing::debug!(config_id = %config_id, "Backchannel logout for unknown client");
        return Err(AppError::InvalidLogoutRequest);
    };
    let Form(form) = form.map_err(|e| {
        tracing::debug!(config_id = %config_id, error = %e, "Malformed backchannel logout request");
        AppError::InvalidLogoutRequest
    })?;

    match handle_logout_token(client, &state.jwks_cache, &state.store, &form.logout_token).await {
        Ok((target, _)) => {
            AuthEvent::new(ACTIVITY_LOGOFF, STATUS_SUCCESS, "Backchannel logout accepted")
                .subject(target.sub.as_deref())
                .config_id(client.id())
                .emit();
            Ok((StatusCode::OK, [(header::CACHE_CONTROL, "no-store")]))
        }
        Err(e) => {
            let message = format!("Logout token rejected: {e}");
            AuthEvent::new(ACTIVITY_LOGOFF, STATUS_FAILURE, &message)
                .config_id(client.id())
                .emit();
            Err(AppError::InvalidLogoutRequest)
        }
    }
}
