//! Shared request/response DTOs.

use serde::{Deserialize, Serialize};

use crate::jose::ValidatedClaims;

/// POST /auth/{config_id}/session request body.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub id_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// POST /auth/{config_id}/session response.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub sub: String,
    pub sid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo: Option<ValidatedClaims>,
}

/// GET /auth/me response.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub config_id: String,
    pub iss: String,
    pub sub: String,
    pub sid: String,
    pub created_at: String,
}

/// POST /backchannel_logout/{config_id} form body.
#[derive(Debug, Deserialize)]
pub struct BackchannelLogoutForm {
    #[serde(default)]
    pub logout_token: String,
}

/// `id_token_hint` carried by an OP logout request, in the query or form.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutHint {
    pub id_token_hint: Option<String>,
}

/// Result of an OP logout request.
#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub provider_matched: bool,
    pub delivered: usize,
    pub failed: usize,
}

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub invalidated: usize,
    pub providers: usize,
}

/// Generic success response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_session_request_deserialization() {
        let json = r#"{"id_token": "it-456", "access_token": "at-123"}"#;
        let req: CreateSessionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.id_token, "it-456");
        assert_eq!(req.access_token.as_deref(), Some("at-123"));
    }

    #[test]
    fn test_create_session_request_without_access_token() {
        let req: CreateSessionRequest = serde_json::from_str(r#"{"id_token": "it"}"#).unwrap();
        assert!(req.access_token.is_none());
    }

    #[test]
    fn test_create_session_response_skips_missing_userinfo() {
        let resp = CreateSessionResponse {
            session_id: "abc".into(),
            sub: "alice".into(),
            sid: String::new(),
            userinfo: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("userinfo").is_none());
        assert_eq!(json["sid"], "");
    }

    #[test]
    fn test_backchannel_form_default() {
        let form: BackchannelLogoutForm = serde_json::from_str("{}").unwrap();
        assert!(form.logout_token.is_empty());
    }
}
