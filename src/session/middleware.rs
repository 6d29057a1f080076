//! Axum middleware enforcing OIDC session invalidation.
//!
//! Reads the signed session cookie, decodes the session id, and attaches an
//! `OidcSessionHandle` to the request extensions only when the store holds
//! the session as active. An invalidated session, or one the store does not
//! know (never registered, or evicted after invalidation), gets a 401 and a
//! cleared cookie.
//!
//! A cookie that fails signature or decoding is treated as "no session".

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use std::sync::Arc;

use super::cookie::{COOKIE_NAME, make_delete_cookie, parse_cookie, verify_cookie};
use super::{SessionInfo, SessionStatus, SessionStore};
use crate::error::AppError;

/// The decoded session behind the request's cookie.
#[derive(Debug, Clone)]
pub struct OidcSessionHandle(pub SessionInfo);

impl<S> FromRequestParts<S> for OidcSessionHandle
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OidcSessionHandle>()
            .cloned()
            .ok_or(AppError::NotAuthenticated)
    }
}

impl<S> OptionalFromRequestParts<S> for OidcSessionHandle
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<OidcSessionHandle>().cloned())
    }
}

/// Middleware configuration.
pub struct SessionLayer {
    pub store: Arc<SessionStore>,
    pub secret: String,
    pub https_only: bool,
}

impl SessionLayer {
    /// Resolve the session referenced by a `Cookie` header, if any.
    pub fn session_from_headers(&self, headers: &axum::http::HeaderMap) -> Option<SessionInfo> {
        let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
        let value = parse_cookie(cookie_header, COOKIE_NAME)?;
        let Some(session_id) = verify_cookie(self.secret.as_bytes(), value) else {
            tracing::debug!("Session cookie failed signature verification");
            return None;
        };
        let info = SessionInfo::from_session_id(&session_id);
        if info.is_none() {
            tracing::debug!("Session cookie carried an undecodable session id");
        }
        info
    }
}

pub async fn session_middleware(layer: Arc<SessionLayer>, mut req: Request, next: Next) -> Response {
    if let Some(info) = layer.session_from_headers(req.headers()) {
        let error = match layer.store.status(&info) {
            SessionStatus::Active => {
                req.extensions_mut().insert(OidcSessionHandle(info));
                return next.run(req).await;
            }
            SessionStatus::Invalidated => AppError::SessionInvalidated,
            SessionStatus::Unknown => AppError::SessionExpired,
        };
        tracing::info!(
            sub = info.sub(),
            config_id = info.config_id(),
            error = %error,
            "Rejecting request for inactive OIDC session"
        );
        return reject_with_cleared_cookie(error, layer.https_only);
    }

    next.run(req).await
}

fn reject_with_cleared_cookie(error: AppError, https_only: bool) -> Response {
    let mut response = error.into_response();
    if let Ok(value) = make_delete_cookie(https_only).parse() {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}
