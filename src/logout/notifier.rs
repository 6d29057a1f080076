//! Logout token construction and delivery to relying parties.
//!
//! The subject comes from a verified `id_token_hint` when one is supplied
//! (expiry is not checked: hints are routinely expired by logout time),
//! otherwise from the authenticated principal. Every relying party of the
//! provider that has a `backchannel_logout_uri` receives its own token.
//! Deliveries are independent and each failure is logged on its own.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinSet;

use super::registry::{ProviderConfig, RelyingPartyClient};
use crate::jose::jws::{PublicKeySource, VerificationKeys, decode_unverified, verify_signature};
use crate::jose::{JoseError, ValidatedClaims};

pub const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";
pub const LOGOUT_TOKEN_TYPE: &str = "logout+jwt";
const LOGOUT_TOKEN_LIFETIME_SECS: u64 = 120;

/// What a fan-out did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub subject: Option<String>,
    pub sid: Option<String>,
    pub delivered: usize,
    pub failed: usize,
}

/// Sends logout notifications for one provider.
pub trait LogoutNotifier: Send + Sync {
    fn send_logout_requests(
        &self,
        provider: &ProviderConfig,
        principal: Option<&str>,
        id_token_hint: Option<&str>,
    ) -> impl Future<Output = LogoutOutcome> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("cannot sign logout token: {0}")]
    Signing(String),

    #[error("POST to {uri} failed: {message}")]
    Delivery { uri: String, message: String },

    #[error("POST to {uri} returned {status}")]
    Status { uri: String, status: u16 },
}

/// Signing and verification keys for a provider.
enum ProviderKeys {
    Hmac,
    Rsa { encoding: EncodingKey, decoding: DecodingKey },
}

impl ProviderKeys {
    fn for_provider(provider: &ProviderConfig) -> Result<(Algorithm, Self), NotifyError> {
        let alg = Algorithm::from_str(&provider.signature_algorithm)
            .map_err(|_| NotifyError::Signing(format!("unknown algorithm {}", provider.signature_algorithm)))?;
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok((alg, Self::Hmac)),
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                let pem = provider
                    .signing_key_pem
                    .as_deref()
                    .ok_or_else(|| NotifyError::Signing(format!("{} requires signing_key_pem", alg_name(alg))))?;
                let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
                    .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
                    .map_err(|e| NotifyError::Signing(e.to_string()))?;
                let encoding =
                    EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| NotifyError::Signing(e.to_string()))?;
                let decoding =
                    DecodingKey::from_rsa_raw_components(&private_key.n().to_bytes_be(), &private_key.e().to_bytes_be());
                Ok((alg, Self::Rsa { encoding, decoding }))
            }
            other => Err(NotifyError::Signing(format!("unsupported algorithm {}", alg_name(other)))),
        }
    }
}

fn alg_name(alg: Algorithm) -> String {
    format!("{alg:?}")
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Claims of a logout token for one relying party.
pub fn logout_token_claims(issuer: &str, client_id: &str, subject: &str, sid: Option<&str>, iat: u64) -> Value {
    let mut claims = json!({
        "iss": issuer,
        "sub": subject,
        "aud": client_id,
        "iat": iat,
        "exp": iat + LOGOUT_TOKEN_LIFETIME_SECS,
        "jti": uuid::Uuid::new_v4().to_string(),
        "events": { BACKCHANNEL_LOGOUT_EVENT: {} },
    });
    if let Some(sid) = sid {
        claims["sid"] = json!(sid);
    }
    claims
}

/// Delivers logout tokens over HTTP.
#[derive(Clone)]
pub struct HttpLogoutNotifier {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpLogoutNotifier {
    pub fn new(http_client: reqwest::Client, timeout: Duration) -> Self {
        Self { http_client, timeout }
    }

    /// Verify a hint against the provider's key and issuer.
    async fn verify_hint(
        &self,
        provider: &ProviderConfig,
        alg: Algorithm,
        keys: &ProviderKeys,
        hint: &str,
    ) -> Result<ValidatedClaims, JoseError> {
        let allowed = [alg];
        let verification = match keys {
            // Signed with the secret of the client the hint was issued to.
            ProviderKeys::Hmac => {
                let client = audience(&decode_unverified(hint)?)
                    .and_then(|aud| provider.client(&aud))
                    .ok_or_else(|| JoseError::Signature("id_token_hint audience is not a registered client".into()))?;
                VerificationKeys {
                    allowed_algorithms: &allowed,
                    shared_secret: Some(client.client_secret.as_bytes()),
                    public: PublicKeySource::None,
                }
            }
            ProviderKeys::Rsa { decoding, .. } => VerificationKeys {
                allowed_algorithms: &allowed,
                shared_secret: None,
                public: PublicKeySource::Static(decoding),
            },
        };
        let claims = verify_signature(hint, &verification).await?;
        check_hint_issuer(provider, claims)
    }

    fn sign(
        &self,
        alg: Algorithm,
        keys: &ProviderKeys,
        client: &RelyingPartyClient,
        claims: &Value,
    ) -> Result<String, NotifyError> {
        let mut header = Header::new(alg);
        header.typ = Some(LOGOUT_TOKEN_TYPE.into());
        let secret;
        let key = match keys {
            ProviderKeys::Hmac => {
                secret = EncodingKey::from_secret(client.client_secret.as_bytes());
                &secret
            }
            ProviderKeys::Rsa { encoding, .. } => encoding,
        };
        encode(&header, claims, key).map_err(|e| NotifyError::Signing(e.to_string()))
    }
}

fn audience(claims: &ValidatedClaims) -> Option<String> {
    match claims.get("aud")? {
        Value::String(aud) => Some(aud.clone()),
        Value::Array(auds) => auds.first().and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

fn check_hint_issuer(provider: &ProviderConfig, claims: ValidatedClaims) -> Result<ValidatedClaims, JoseError> {
    match claims.get("iss").and_then(Value::as_str) {
        Some(iss) if iss == provider.issuer => Ok(claims),
        _ => Err(JoseError::Signature("id_token_hint was not issued by this provider".into())),
    }
}

async fn deliver(http_client: reqwest::Client, uri: String, token: String, timeout: Duration) -> Result<(), NotifyError> {
    let response = http_client
        .post(&uri)
        .form(&[("logout_token", token.as_str())])
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| NotifyError::Delivery {
            uri: uri.clone(),
            message: e.to_string(),
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Status {
            uri,
            status: status.as_u16(),
        });
    }
    Ok(())
}

impl LogoutNotifier for HttpLogoutNotifier {
    async fn send_logout_requests(
        &self,
        provider: &ProviderConfig,
        principal: Option<&str>,
        id_token_hint: Option<&str>,
    ) -> LogoutOutcome {
        let mut outcome = LogoutOutcome::default();
        let (alg, keys) = match ProviderKeys::for_provider(provider) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(provider = %provider.provider_id, error = %e, "Provider cannot sign logout tokens");
                return outcome;
            }
        };

        let mut hint_claims = None;
        if let Some(hint) = id_token_hint.filter(|h| !h.is_empty()) {
            match self.verify_hint(provider, alg, &keys, hint).await {
                Ok(claims) => hint_claims = Some(claims),
                Err(e) => tracing::warn!(provider = %provider.provider_id, error = %e, "Ignoring id_token_hint"),
            }
        }
        let claim = |name: &str| {
            hint_claims
                .as_ref()
                .and_then(|c| c.get(name))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        outcome.subject = claim("sub").or_else(|| principal.filter(|p| !p.is_empty()).map(String::from));
        outcome.sid = claim("sid");

        let Some(subject) = outcome.subject.clone() else {
            tracing::debug!(provider = %provider.provider_id, "No subject for logout; nothing to send");
            return outcome;
        };

        let iat = now_secs();
        let mut deliveries = JoinSet::new();
        for client in &provider.clients {
            let Some(uri) = client.backchannel_logout_uri.clone() else {
                continue;
            };
            let claims = logout_token_claims(&provider.issuer, &client.client_id, &subject, outcome.sid.as_deref(), iat);
            let token = match self.sign(alg, &keys, client, &claims) {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(client_id = %client.client_id, error = %e, "Failed to build logout token");
                    outcome.failed += 1;
                    continue;
                }
            };
            let client_id = client.client_id.clone();
            let http_client = self.http_client.clone();
            let timeout = self.timeout;
            deliveries.spawn(async move { (client_id, deliver(http_client, uri, token, timeout).await) });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((client_id, Ok(()))) => {
                    tracing::debug!(%client_id, "Delivered logout token");
                    outcome.delivered += 1;
                }
                Ok((client_id, Err(e))) => {
                    tracing::warn!(%client_id, error = %e, "Backchannel logout delivery failed");
                    outcome.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Backchannel logout task failed");
                    outcome.failed += 1;
                }
            }
        }

        tracing::info!(
            provider = %provider.provider_id,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "Backchannel logout fan-out finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use std::sync::OnceLock;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ISSUER: &str = "https://op.example.com/oidc/endpoint/OP";
    const SECRET: &str = "rp-secret-0123456789abcdef0123456789";

    fn rsa_pem() -> &'static str {
        static PEM: OnceLock<String> = OnceLock::new();
        PEM.get_or_init(|| {
            let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("key generation");
            key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
        })
    }

    fn rp(client_id: &str, uri: Option<String>) -> RelyingPartyClient {
        RelyingPartyClient {
            client_id: client_id.into(),
            client_secret: SECRET.into(),
            backchannel_logout_uri: uri,
        }
    }

    fn provider(clients: Vec<RelyingPartyClient>) -> ProviderConfig {
        ProviderConfig {
            provider_id: "OP".into(),
            issuer: ISSUER.into(),
            signature_algorithm: "HS256".into(),
            signing_key_pem: None,
            clients,
        }
    }

    fn notifier() -> HttpLogoutNotifier {
        HttpLogoutNotifier::new(reqwest::Client::new(), Duration::from_secs(2))
    }

    fn hint(claims: Value) -> String {
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn test_logout_token_claims() {
        let claims = logout_token_claims(ISSUER, "rp1", "alice", Some("sid-1"), 1000);
        assert_eq!(claims["iss"], ISSUER);
        assert_eq!(claims["aud"], "rp1");
        assert_eq!(claims["exp"], 1120);
        assert_eq!(claims["sid"], "sid-1");
        assert!(claims["events"][BACKCHANNEL_LOGOUT_EVENT].is_object());
        assert!(claims.get("nonce").is_none());
        assert!(!claims["jti"].as_str().unwrap().is_empty());

        let without_sid = logout_token_claims(ISSUER, "rp1", "alice", None, 1000);
        assert!(without_sid.get("sid").is_none());
    }

    #[tokio::test]
    async fn test_fan_out_to_each_rp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rp1/bcl"))
            .and(body_string_contains("logout_token="))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rp2/bcl"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(vec![
            rp("rp1", Some(format!("{}/rp1/bcl", server.uri()))),
            rp("rp2", Some(format!("{}/rp2/bcl", server.uri()))),
            rp("rp3", None),
        ]);
        let outcome = notifier().send_logout_requests(&provider, Some("alice"), None).await;
        assert_eq!(outcome.subject.as_deref(), Some("alice"));
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 1);
    }

    #[tokio::test]
    async fn test_subject_and_sid_from_hint() {
        let provider = provider(vec![rp("rp1", None)]);
        // Expired hints are still usable.
        let hint = hint(json!({"iss": ISSUER, "aud": "rp1", "sub": "bob", "sid": "s-9", "exp": 1000}));
        let outcome = notifier().send_logout_requests(&provider, Some("alice"), Some(&hint)).await;
        assert_eq!(outcome.subject.as_deref(), Some("bob"));
        assert_eq!(outcome.sid.as_deref(), Some("s-9"));
    }

    #[tokio::test]
    async fn test_forged_hint_falls_back_to_principal() {
        let provider = provider(vec![rp("rp1", None)]);
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &json!({"iss": ISSUER, "aud": "rp1", "sub": "bob"}),
            &EncodingKey::from_secret(b"wrong-secret-wrong-secret-wrong!"),
        )
        .unwrap();
        let outcome = notifier().send_logout_requests(&provider, Some("alice"), Some(&forged)).await;
        assert_eq!(outcome.subject.as_deref(), Some("alice"));
        assert!(outcome.sid.is_none());
    }

    #[tokio::test]
    async fn test_hint_from_other_issuer_ignored() {
        let provider = provider(vec![rp("rp1", None)]);
        let hint = hint(json!({"iss": "https://elsewhere", "aud": "rp1", "sub": "bob"}));
        let outcome = notifier().send_logout_requests(&provider, None, Some(&hint)).await;
        assert!(outcome.subject.is_none());
    }

    #[tokio::test]
    async fn test_no_subject_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let provider = provider(vec![rp("rp1", Some(format!("{}/bcl", server.uri())))]);
        let outcome = notifier().send_logout_requests(&provider, None, None).await;
        assert_eq!(outcome, LogoutOutcome::default());
    }

    #[test]
    fn test_rs256_token_signed_with_provider_key() {
        let mut provider = provider(vec![rp("rp1", None)]);
        provider.signature_algorithm = "RS256".into();
        provider.signing_key_pem = Some(rsa_pem().to_string());

        let (alg, keys) = ProviderKeys::for_provider(&provider).unwrap();
        let claims = logout_token_claims(ISSUER, "rp1", "alice", None, now_secs());
        let token = notifier().sign(alg, &keys, &provider.clients[0], &claims).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.typ.as_deref(), Some(LOGOUT_TOKEN_TYPE));
        assert_eq!(decode_unverified(&token).unwrap()["sub"], "alice");
    }

    #[test]
    fn test_rs256_without_key_is_error() {
        let mut provider = provider(Vec::new());
        provider.signature_algorithm = "RS256".into();
        assert!(matches!(ProviderKeys::for_provider(&provider), Err(NotifyError::Signing(_))));
    }
}
