//! Relying-party handling of inbound backchannel logout tokens.

use serde_json::Value;

use super::notifier::{BACKCHANNEL_LOGOUT_EVENT, now_secs};
use crate::client::OidcClient;
use crate::jose::jws::{JwksCache, verify_signature};
use crate::jose::{JoseError, ValidatedClaims, is_jwe};
use crate::session::{SessionSelector, SessionStore};

/// Tolerated clock difference between the provider and us.
pub const CLOCK_SKEW_SECS: u64 = 60;
/// Oldest `iat` accepted on an inbound logout token.
pub const LOGOUT_TOKEN_MAX_AGE_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum LogoutTokenError {
    #[error("logout token missing")]
    Missing,

    #[error(transparent)]
    Jose(#[from] JoseError),

    #[error("logout token issuer {actual:?} does not match {expected:?}")]
    IssuerMismatch { expected: String, actual: Option<String> },

    #[error("logout token audience does not include {0}")]
    AudienceMismatch(String),

    #[error("logout token has no iat claim")]
    MissingIssuedAt,

    #[error("logout token iat {0} is outside the accepted window")]
    IssuedAtOutOfRange(u64),

    #[error("logout token expired at {0}")]
    Expired(u64),

    #[error("logout token has no backchannel-logout event")]
    MissingEvent,

    #[error("logout token must not contain a nonce")]
    NonceNotAllowed,

    #[error("logout token has neither sub nor sid")]
    MissingSubjectAndSid,
}

/// Which sessions a logout token names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutTarget {
    pub sub: Option<String>,
    pub sid: Option<String>,
}

fn numeric_date(claims: &ValidatedClaims, name: &str) -> Option<u64> {
    let value = claims.get(name)?;
    value.as_u64().or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// Check the claims of an already signature-verified logout token.
///
/// `iat` must fall within [`LOGOUT_TOKEN_MAX_AGE_SECS`] of `now` and, when
/// present, `exp` must not have passed; both allow [`CLOCK_SKEW_SECS`].
pub fn validate_logout_claims(
    claims: &ValidatedClaims,
    issuer: &str,
    client_id: &str,
    now: u64,
) -> Result<LogoutTarget, LogoutTokenError> {
    let iss = claims.get("iss").and_then(Value::as_str);
    if iss != Some(issuer) {
        return Err(LogoutTokenError::IssuerMismatch {
            expected: issuer.to_string(),
            actual: iss.map(String::from),
        });
    }

    let audience_ok = match claims.get("aud") {
        Some(Value::String(aud)) => aud == client_id,
        Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(client_id)),
        _ => false,
    };
    if !audience_ok {
        return Err(LogoutTokenError::AudienceMismatch(client_id.to_string()));
    }

    let iat = numeric_date(claims, "iat").ok_or(LogoutTokenError::MissingIssuedAt)?;
    if iat > now.saturating_add(CLOCK_SKEW_SECS) || now.saturating_sub(iat) > LOGOUT_TOKEN_MAX_AGE_SECS {
        return Err(LogoutTokenError::IssuedAtOutOfRange(iat));
    }
    if let Some(exp) = numeric_date(claims, "exp")
        && exp.saturating_add(CLOCK_SKEW_SECS) < now
    {
        return Err(LogoutTokenError::Expired(exp));
    }

    let has_event = claims
        .get("events")
        .and_then(Value::as_object)
        .is_some_and(|events| events.get(BACKCHANNEL_LOGOUT_EVENT).is_some_and(Value::is_object));
    if !has_event {
        return Err(LogoutTokenError::MissingEvent);
    }

    if claims.contains_key("nonce") {
        return Err(LogoutTokenError::NonceNotAllowed);
    }

    let string_claim = |name: &str| {
        claims
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let target = LogoutTarget {
        sub: string_claim("sub"),
        sid: string_claim("sid"),
    };
    if target.sub.is_none() && target.sid.is_none() {
        return Err(LogoutTokenError::MissingSubjectAndSid);
    }
    Ok(target)
}

/// Invalidate the sessions a target names among those `client` created at
/// its own issuer. Returns whether anything changed.
pub fn apply_logout(store: &SessionStore, client: &OidcClient, target: &LogoutTarget) -> bool {
    store.invalidate_selected(&SessionSelector {
        config_id: client.id(),
        iss: client.issuer(),
        sub: target.sub.as_deref(),
        sid: target.sid.as_deref(),
    })
}

/// Verify a logout token sent to `client` and invalidate the sessions it
/// names. An encrypted token is decrypted with the client's key first.
pub async fn handle_logout_token(
    client: &OidcClient,
    jwks: &JwksCache,
    store: &SessionStore,
    token: &str,
) -> Result<(LogoutTarget, bool), LogoutTokenError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(LogoutTokenError::Missing);
    }
    let jws = if is_jwe(token) {
        client.jwe().decrypt(token)?
    } else {
        token.to_string()
    };

    let claims = verify_signature(&jws, &client.verification_keys(jwks)).await?;
    let target = validate_logout_claims(&claims, client.issuer(), client.client_id(), now_secs())?;
    let changed = apply_logout(store, client, &target);

    tracing::info!(
        client = client.id(),
        sub = target.sub.as_deref(),
        sid = target.sid.as_deref(),
        changed,
        "Processed backchannel logout token"
    );
    Ok((target, changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryFile;
    use crate::logout::notifier::logout_token_claims;
    use crate::session::SessionInfo;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use serde_json::json;

    const ISSUER: &str = "https://op.example.com";
    const SECRET: &str = "rp-secret-0123456789abcdef0123456789";

    fn client() -> OidcClient {
        let json = json!({
            "clients": [{
                "id": "rp1",
                "client_id": "client-1",
                "client_secret": SECRET,
                "issuer": ISSUER,
                "signature_algorithms": ["HS256"],
            }]
        });
        OidcClient::from_config(RegistryFile::from_json(&json.to_string()).unwrap().clients.remove(0)).unwrap()
    }

    fn sign(claims: &Value) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some("logout+jwt".into());
        encode(&header, claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    const NOW: u64 = 1_700_000_000;

    fn claims_map(value: Value) -> ValidatedClaims {
        serde_json::from_value(value).unwrap()
    }

    fn store_with(sessions: &[SessionInfo]) -> SessionStore {
        let store = SessionStore::new();
        for s in sessions {
            assert!(store.insert(s.clone()));
        }
        store
    }

    #[test]
    fn test_valid_claims() {
        let claims = claims_map(logout_token_claims(ISSUER, "client-1", "alice", Some("sid-1"), NOW));
        let target = validate_logout_claims(&claims, ISSUER, "client-1", NOW).unwrap();
        assert_eq!(target.sub.as_deref(), Some("alice"));
        assert_eq!(target.sid.as_deref(), Some("sid-1"));
    }

    #[test]
    fn test_audience_array() {
        let mut value = logout_token_claims(ISSUER, "client-1", "alice", None, NOW);
        value["aud"] = json!(["other", "client-1"]);
        assert!(validate_logout_claims(&claims_map(value), ISSUER, "client-1", NOW).is_ok());
    }

    #[test]
    fn test_issued_at_window() {
        let at = |iat: u64| {
            let mut value = logout_token_claims(ISSUER, "client-1", "alice", None, iat);
            value.as_object_mut().unwrap().remove("exp");
            validate_logout_claims(&claims_map(value), ISSUER, "client-1", NOW)
        };

        assert!(at(NOW - LOGOUT_TOKEN_MAX_AGE_SECS).is_ok());
        assert!(at(NOW + CLOCK_SKEW_SECS).is_ok());
        assert!(matches!(
            at(NOW - LOGOUT_TOKEN_MAX_AGE_SECS - 1),
            Err(LogoutTokenError::IssuedAtOutOfRange(_))
        ));
        assert!(matches!(
            at(NOW + CLOCK_SKEW_SECS + 1),
            Err(LogoutTokenError::IssuedAtOutOfRange(_))
        ));
        assert!(matches!(at(1), Err(LogoutTokenError::IssuedAtOutOfRange(1))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut value = logout_token_claims(ISSUER, "client-1", "alice", Some("sid-1"), NOW - 200);
        value["exp"] = json!(NOW - CLOCK_SKEW_SECS - 1);
        let err = validate_logout_claims(&claims_map(value.clone()), ISSUER, "client-1", NOW).unwrap_err();
        assert!(matches!(err, LogoutTokenError::Expired(_)));

        value["exp"] = json!(NOW - CLOCK_SKEW_SECS);
        assert!(validate_logout_claims(&claims_map(value), ISSUER, "client-1", NOW).is_ok());
    }

    #[test]
    fn test_claim_rejections() {
        let base = logout_token_claims(ISSUER, "client-1", "alice", Some("sid-1"), NOW);

        let check = |mutate: &dyn Fn(&mut Value)| {
            let mut value = base.clone();
            mutate(&mut value);
            validate_logout_claims(&claims_map(value), ISSUER, "client-1", NOW).unwrap_err()
        };

        assert!(matches!(
            check(&|v| v["iss"] = json!("https://evil")),
            LogoutTokenError::IssuerMismatch { .. }
        ));
        assert!(matches!(
            check(&|v| v["aud"] = json!("other")),
            LogoutTokenError::AudienceMismatch(_)
        ));
        assert!(matches!(
            check(&|v| {
                v.as_object_mut().unwrap().remove("iat");
            }),
            LogoutTokenError::MissingIssuedAt
        ));
        assert!(matches!(
            check(&|v| v["events"] = json!({})),
            LogoutTokenError::MissingEvent
        ));
        assert!(matches!(
            check(&|v| v["nonce"] = json!("n")),
            LogoutTokenError::NonceNotAllowed
        ));
        assert!(matches!(
            check(&|v| {
                let obj = v.as_object_mut().unwrap();
                obj.remove("sub");
                obj.remove("sid");
            }),
            LogoutTokenError::MissingSubjectAndSid
        ));
    }

    #[tokio::test]
    async fn test_sub_and_sid_invalidates_that_session() {
        let a = SessionInfo::new("rp1", ISSUER, "alice", "sid-1", "1");
        let b = SessionInfo::new("rp1", ISSUER, "alice", "sid-2", "2");
        let store = store_with(&[a.clone(), b.clone()]);
        let jwks = JwksCache::new(reqwest::Client::new());

        let token = sign(&logout_token_claims(ISSUER, "client-1", "alice", Some("sid-1"), now_secs()));
        let (_, changed) = handle_logout_token(&client(), &jwks, &store, &token).await.unwrap();
        assert!(changed);
        assert!(store.is_invalidated(&a));
        assert!(!store.is_invalidated(&b));
    }

    #[tokio::test]
    async fn test_sub_only_invalidates_all() {
        let a = SessionInfo::new("rp1", ISSUER, "alice", "sid-1", "1");
        let b = SessionInfo::new("rp1", ISSUER, "alice", "", "2");
        let store = store_with(&[a.clone(), b.clone()]);
        let jwks = JwksCache::new(reqwest::Client::new());

        let token = sign(&logout_token_claims(ISSUER, "client-1", "alice", None, now_secs()));
        handle_logout_token(&client(), &jwks, &store, &token).await.unwrap();
        assert!(store.is_invalidated(&a));
        assert!(store.is_invalidated(&b));
    }

    #[tokio::test]
    async fn test_sid_only() {
        let a = SessionInfo::new("rp1", ISSUER, "alice", "sid-1", "1");
        let store = store_with(std::slice::from_ref(&a));
        let jwks = JwksCache::new(reqwest::Client::new());

        let mut claims = logout_token_claims(ISSUER, "client-1", "ignored", Some("sid-1"), now_secs());
        claims.as_object_mut().unwrap().remove("sub");
        let (target, changed) = handle_logout_token(&client(), &jwks, &store, &sign(&claims)).await.unwrap();
        assert!(target.sub.is_none());
        assert!(changed);
        assert!(store.is_invalidated(&a));
    }

    #[tokio::test]
    async fn test_forged_token_rejected() {
        let a = SessionInfo::new("rp1", ISSUER, "alice", "sid-1", "1");
        let store = store_with(std::slice::from_ref(&a));
        let jwks = JwksCache::new(reqwest::Client::new());

        let forged = encode(
            &Header::new(Algorithm::HS256),
            &logout_token_claims(ISSUER, "client-1", "alice", Some("sid-1"), now_secs()),
            &EncodingKey::from_secret(b"attacker-secret-attacker-secret!"),
        )
        .unwrap();
        let err = handle_logout_token(&client(), &jwks, &store, &forged).await.unwrap_err();
        assert!(matches!(err, LogoutTokenError::Jose(JoseError::Signature(_))));
        assert!(!store.is_invalidated(&a));
    }

    #[tokio::test]
    async fn test_empty_token() {
        let store = SessionStore::new();
        let jwks = JwksCache::new(reqwest::Client::new());
        let err = handle_logout_token(&client(), &jwks, &store, "  ").await.unwrap_err();
        assert!(matches!(err, LogoutTokenError::Missing));
    }

    #[tokio::test]
    async fn test_unknown_session_is_ok_but_unchanged() {
        let store = SessionStore::new();
        let jwks = JwksCache::new(reqwest::Client::new());
        let token = sign(&logout_token_claims(ISSUER, "client-1", "nobody", Some("sid-x"), now_secs()));
        let (_, changed) = handle_logout_token(&client(), &jwks, &store, &token).await.unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_stale_token_leaves_sessions_active() {
        let a = SessionInfo::new("rp1", ISSUER, "alice", "sid-1", "1");
        let store = store_with(std::slice::from_ref(&a));
        let jwks = JwksCache::new(reqwest::Client::new());

        let token = sign(&logout_token_claims(ISSUER, "client-1", "alice", Some("sid-1"), 1));
        let err = handle_logout_token(&client(), &jwks, &store, &token).await.unwrap_err();
        assert!(matches!(err, LogoutTokenError::IssuedAtOutOfRange(1)));
        assert!(!store.is_invalidated(&a));
    }

    #[tokio::test]
    async fn test_only_own_issuer_and_config_affected() {
        let own = SessionInfo::new("rp1", ISSUER, "alice", "sid-1", "1");
        let other_issuer = SessionInfo::new("rp2", "https://other-op.example.com", "alice", "sid-1", "2");
        let other_config = SessionInfo::new("rp3", ISSUER, "alice", "sid-1", "3");
        let store = store_with(&[own.clone(), other_issuer.clone(), other_config.clone()]);
        let jwks = JwksCache::new(reqwest::Client::new());

        let token = sign(&logout_token_claims(ISSUER, "client-1", "alice", None, now_secs()));
        let (_, changed) = handle_logout_token(&client(), &jwks, &store, &token).await.unwrap();
        assert!(changed);
        assert!(store.is_invalidated(&own));
        assert!(!store.is_invalidated(&other_issuer));
        assert!(!store.is_invalidated(&other_config));
        assert_eq!(store.active_count(), 2);

        let mut claims = logout_token_claims(ISSUER, "client-1", "ignored", Some("sid-1"), now_secs());
        claims.as_object_mut().unwrap().remove("sub");
        let (_, changed) = handle_logout_token(&client(), &jwks, &store, &sign(&claims)).await.unwrap();
        assert!(!changed);
        assert_eq!(store.active_count(), 2);
    }
}
