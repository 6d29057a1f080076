//! POST /auth/{config_id}/session

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::audit::{ACTIVITY_LOGON, AuthEvent, SEVERITY_HIGH, STATUS_FAILURE, STATUS_SUCCESS};
use crate::client::OidcClient;
use crate::error::AppError;
use crate::jose::ValidatedClaims;
use crate::jose::jws::verify_id_token;
use crate::session::SessionInfo;
use crate::session::cookie::make_set_cookie;
use crate::types::{CreateSessionRequest, CreateSessionResponse};
use crate::userinfo::{TokenResponseValidator, UserInfoRequestor, validate_claims};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn claim_str<'a>(claims: &'a ValidatedClaims, name: &str) -> Option<&'a str> {
    claims.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Create a tracked session from a provider-issued ID token.
///
/// When the request carries an access token and the client has a UserInfo
/// endpoint, the UserInfo claims are fetched and must name the same subject.
pub async fn create_session(
    State(state): State<Arc<crate::AppState>>,
    Path(config_id): Path<String>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = state.client(&config_id)?;
    if body.id_token.trim().is_empty() {
        return Err(AppError::BadRequest("Missing id_token".into()));
    }

    let keys = client.verification_keys(&state.jwks_cache);
    let claims = match verify_id_token(body.id_token.trim(), &keys, client.issuer(), client.client_id()).await {
        Ok(claims) => claims,
        Err(e) => {
            let message = format!("ID token rejected: {e}");
            AuthEvent::new(ACTIVITY_LOGON, STATUS_FAILURE, &message)
                .severity(SEVERITY_HIGH)
                .config_id(client.id())
                .emit();
            return Err(AppError::TokenVerificationFailed);
        }
    };

    let sub = claim_str(&claims, "sub")
        .ok_or(AppError::TokenVerificationFailed)?
        .to_string();
    let iss = claim_str(&claims, "iss").unwrap_or(client.issuer()).to_string();
    let sid = claim_str(&claims, "sid").unwrap_or_default().to_string();

    let userinfo = match body.access_token.as_deref().filter(|t| !t.is_empty()) {
        Some(access_token) => fetch_userinfo(&state, client, access_token, &sub).await?,
        None => None,
    };

    let info = SessionInfo::new(client.id(), iss, sub.clone(), sid.clone(), now_millis().to_string());
    let session_id = info.session_id().to_string();
    state.store.insert(info);

    AuthEvent::new(ACTIVITY_LOGON, STATUS_SUCCESS, "Session created")
        .subject(Some(&sub))
        .session(&session_id)
        .config_id(client.id())
        .emit();

    let cookie = make_set_cookie(&state.config.session_secret, &session_id, state.config.session_https_only);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(CreateSessionResponse {
            session_id,
            sub,
            sid,
            userinfo,
        }),
    ))
}

async fn fetch_userinfo(
    state: &crate::AppState,
    client: &OidcClient,
    access_token: &str,
    sub: &str,
) -> Result<Option<ValidatedClaims>, AppError> {
    let Some(endpoint) = client.userinfo_endpoint() else {
        return Ok(None);
    };

    let validator = TokenResponseValidator::new(client, &state.jwks_cache, state.config.jwt_userinfo_enabled);
    let claims = UserInfoRequestor::new(&state.http_client, endpoint, access_token, client.client_id())
        .timeout(state.config.http_timeout)
        .allow_insecure(state.config.allow_insecure_endpoints)
        .request_claims(&validator)
        .await
        .map_err(|e| {
            tracing::warn!(client = client.id(), error = %e, "UserInfo request failed");
            AppError::UserInfoFailed(e.to_string())
        })?;

    if let Some(claims) = &claims {
        validate_claims(claims, Some(sub)).map_err(|e| {
            tracing::warn!(client = client.id(), error = %e, "UserInfo claims rejected");
            AppError::UserInfoFailed(e.to_string())
        })?;
    }
    Ok(claims)
}
