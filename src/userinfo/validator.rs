//! Claims extraction from UserInfo-style endpoint responses.
//!
//! A non-200 status or an unrecognised content type yields no claims. JSON
//! bodies are parsed directly. `application/jwt` bodies (behind a feature
//! flag) may be a JWS, or a JWE wrapping either a JWS or plain JSON; a JWE
//! wrapping another JWE is refused.

use std::sync::Once;

use crate::client::OidcClient;
use crate::jose::jws::{JwksCache, verify_signature};
use crate::jose::{JoseError, TokenEnvelope, ValidatedClaims, is_jwe};

use super::response::EndpointResponse;

const APPLICATION_JSON: &str = "application/json";
const APPLICATION_JWT: &str = "application/jwt";

static JWT_RESPONSES_ANNOUNCED: Once = Once::new();

#[derive(Debug, thiserror::Error)]
pub enum TokenResponseError {
    #[error("response declared application/jwt but is not a compact token")]
    InvalidTokenFormat,

    #[error(transparent)]
    Jose(#[from] JoseError),

    #[error("claims are missing the sub claim")]
    MissingSubject,

    #[error("sub claim {actual:?} does not match expected subject {expected:?}")]
    SubjectMismatch { expected: String, actual: String },

    #[error("decrypted payload is not a JSON object")]
    MalformedClaims,
}

pub struct TokenResponseValidator<'a> {
    client: &'a OidcClient,
    jwks: &'a JwksCache,
    jwt_enabled: bool,
}

impl<'a> TokenResponseValidator<'a> {
    pub fn new(client: &'a OidcClient, jwks: &'a JwksCache, jwt_enabled: bool) -> Self {
        Self {
            client,
            jwks,
            jwt_enabled,
        }
    }

    /// `Ok(None)` means the response carries no claims. Trust failures on the
    /// JWT path are errors.
    pub async fn validate(&self, response: &EndpointResponse) -> Result<Option<ValidatedClaims>, TokenResponseError> {
        if response.status != 200 {
            tracing::debug!(status = response.status, "Endpoint returned an error response");
            return Ok(None);
        }

        if response.has_content_type(APPLICATION_JSON) {
            let claims = serde_json::from_str::<ValidatedClaims>(&response.body);
            if let Err(e) = &claims {
                tracing::debug!(error = %e, "Endpoint response is not a JSON object");
            }
            return Ok(claims.ok());
        }

        if response.has_content_type(APPLICATION_JWT) {
            if !self.jwt_enabled {
                tracing::debug!("JWT endpoint responses are disabled");
                return Ok(None);
            }
            JWT_RESPONSES_ANNOUNCED.call_once(|| {
                tracing::info!("Accepting application/jwt endpoint responses");
            });
            return self.claims_from_jwt(response.body.trim()).await.map(Some);
        }

        tracing::debug!(content_type = ?response.content_type, "No claims in endpoint response");
        Ok(None)
    }

    async fn claims_from_jwt(&self, token: &str) -> Result<ValidatedClaims, TokenResponseError> {
        let from_jwe = is_jwe(token);
        let payload = if from_jwe {
            self.client.jwe().decrypt(token)?
        } else {
            token.to_string()
        };

        match TokenEnvelope::classify(&payload) {
            Some(TokenEnvelope::SignedJws(jws)) => {
                let keys = self.client.verification_keys(self.jwks);
                Ok(verify_signature(&jws, &keys).await?)
            }
            Some(TokenEnvelope::EncryptedJwe(_)) if from_jwe => Err(JoseError::NestedJwe.into()),
            Some(TokenEnvelope::Plain(claims)) if from_jwe => Ok(claims),
            None if from_jwe => Err(TokenResponseError::MalformedClaims),
            _ => Err(TokenResponseError::InvalidTokenFormat),
        }
    }
}

/// Require `sub`, and when a subject is expected, an exact match.
pub fn validate_claims(claims: &ValidatedClaims, expected_sub: Option<&str>) -> Result<(), TokenResponseError> {
    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(TokenResponseError::MissingSubject)?;

    if let Some(expected) = expected_sub
        && expected != sub
    {
        return Err(TokenResponseError::SubjectMismatch {
            expected: expected.to_string(),
            actual: sub.to_string(),
        });
    }
    Ok(())
}
