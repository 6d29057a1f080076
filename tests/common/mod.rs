//! Test utilities: RSA keypair, token factories, test app builder.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oidc_session_handler::config::{ClientConfig, Config};
use oidc_session_handler::logout::{ProviderConfig, RelyingPartyClient};
use oidc_session_handler::session::SessionInfo;
use oidc_session_handler::session::cookie::{COOKIE_NAME, sign_session_id};
use oidc_session_handler::{AppState, create_app};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CONFIG_ID: &str = "rp1";
pub const CLIENT_ID: &str = "client-1";
pub const CLIENT_SECRET: &str = "rp-secret-0123456789abcdef0123456789";
pub const ISSUER: &str = "https://op.example.com/oidc/endpoint/OP";
pub const PROVIDER_ID: &str = "OP";

/// Test RSA keypair for signing JWTs.
pub struct TestKeys {
    pub private_key: RsaPrivateKey,
    pub kid: String,
}

impl TestKeys {
    pub fn generate() -> Self {
        let mut rng = rsa::rand_core::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate key");
        Self {
            private_key,
            kid: "test-key-1".into(),
        }
    }

    /// Build an RS256 JWT with the given claims.
    pub fn sign_jwt(&self, claims: &Value) -> String {
        let der = self
            .private_key
            .to_pkcs1_der()
            .expect("failed to encode private key");
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());

        encode(&header, claims, &encoding_key).expect("failed to sign JWT")
    }

    /// Build JWKS JSON response for wiremock.
    pub fn jwks_json(&self) -> Value {
        json!({
            "keys": [{
                "kid": self.kid,
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "n": URL_SAFE_NO_PAD.encode(self.private_key.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(self.private_key.e().to_bytes_be())
            }]
        })
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// HS256 token signed with the test client's secret.
pub fn sign_hs256(claims: &Value) -> String {
    sign_hs256_with(CLIENT_SECRET, claims)
}

pub fn sign_hs256_with(secret: &str, claims: &Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to sign JWT")
}

/// Valid ID token claims for the test client.
pub fn id_token_claims(sub: &str, sid: Option<&str>) -> Value {
    let now = now_secs();
    let mut claims = json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": sub,
        "iat": now,
        "exp": now + 3600,
    });
    if let Some(sid) = sid {
        claims["sid"] = json!(sid);
    }
    claims
}

/// The test relying-party client, accepting HS256 (client secret) and
/// RS256 (when `jwks_uri` is given).
pub fn client_config(jwks_uri: Option<String>, userinfo_endpoint: Option<String>) -> ClientConfig {
    ClientConfig {
        id: CONFIG_ID.into(),
        client_id: CLIENT_ID.into(),
        client_secret: CLIENT_SECRET.into(),
        issuer: ISSUER.into(),
        jwks_uri,
        userinfo_endpoint,
        signature_algorithms: vec!["HS256".into(), "RS256".into()],
        key_management_algorithm: "RSA-OAEP-256".into(),
        content_encryption_algorithm: "A256GCM".into(),
        decryption_key_pem: None,
        encryption_public_key_pem: None,
        key_id: None,
    }
}

/// A provider whose only relying party is the test client.
pub fn provider_config(backchannel_logout_uri: Option<String>) -> ProviderConfig {
    ProviderConfig {
        provider_id: PROVIDER_ID.into(),
        issuer: ISSUER.into(),
        signature_algorithm: "HS256".into(),
        signing_key_pem: None,
        clients: vec![RelyingPartyClient {
            client_id: CLIENT_ID.into(),
            client_secret: CLIENT_SECRET.into(),
            backchannel_logout_uri,
        }],
    }
}

/// Default test config with the test client registered.
pub fn test_config() -> Config {
    let mut config = Config::test_default();
    config.clients = vec![client_config(None, None)];
    config
}

pub fn build_test_app() -> (axum::Router, Arc<AppState>) {
    build_test_app_with_config(test_config())
}

pub fn build_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::from_config(config).expect("invalid test config"));
    let app = create_app(state.clone());
    (app, state)
}

/// Register a session in the store and return its `Cookie` header value.
pub fn seed_session(state: &AppState, sub: &str, sid: &str) -> (SessionInfo, String) {
    let info = SessionInfo::new(CONFIG_ID, ISSUER, sub, sid, now_secs().saturating_mul(1000).to_string());
    state.store.insert(info.clone());
    let cookie = session_cookie(&state.config.session_secret, &info);
    (info, cookie)
}

pub fn session_cookie(secret: &str, info: &SessionInfo) -> String {
    format!("{COOKIE_NAME}={}", sign_session_id(secret.as_bytes(), info.session_id()))
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
