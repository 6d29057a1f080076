//! GET /auth/me

use axum::Json;

use crate::session::middleware::OidcSessionHandle;
use crate::types::MeResponse;

/// Describe the session behind the request's cookie.
pub async fn me(OidcSessionHandle(info): OidcSessionHandle) -> Json<MeResponse> {
    Json(MeResponse {
        config_id: info.config_id().to_string(),
        iss: info.iss().to_string(),
        sub: info.sub().to_string(),
        sid: info.sid().to_string(),
        created_at: info.timestamp().to_string(),
    })
}
