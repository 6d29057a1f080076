//! JWS signature verification and the JWKS cache.
//!
//! The header's `alg` picks the key: `HS*` uses a shared secret, everything
//! else a public key (from a JWKS fetched by URI, or a key configured
//! locally). The algorithm must be in the caller's allow-list before any key
//! is touched.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use super::{JoseError, ValidatedClaims, decode_json_segment};

const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Per-URI cache of `kid → DecodingKey`, refreshed after the TTL.
pub struct JwksCache {
    entries: DashMap<String, (HashMap<String, DecodingKey>, Instant)>,
    http_client: reqwest::Client,
}

impl JwksCache {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            entries: DashMap::new(),
            http_client,
        }
    }

    /// Fetch or return cached keys for one JWKS endpoint.
    pub async fn get_keys(&self, jwks_uri: &str) -> Result<HashMap<String, DecodingKey>, JoseError> {
        if let Some(entry) = self.entries.get(jwks_uri)
            && entry.1.elapsed() < JWKS_TTL
        {
            return Ok(entry.0.clone());
        }

        let resp = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| JoseError::JwksFetchFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(JoseError::JwksFetchFailed(format!("HTTP {}", resp.status())));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| JoseError::JwksFetchFailed(e.to_string()))?;
        let keys = parse_jwks(&body);
        tracing::debug!(jwks_uri, keys = keys.len(), "Fetched JWKS");

        self.entries
            .insert(jwks_uri.to_string(), (keys.clone(), Instant::now()));
        Ok(keys)
    }
}

/// Keys with no `kid` are stored under the empty string. Entries that do not
/// convert (unknown `kty`, missing members) are skipped.
fn parse_jwks(body: &Value) -> HashMap<String, DecodingKey> {
    let Some(keys) = body.get("keys").and_then(Value::as_array) else {
        return HashMap::new();
    };
    keys.iter()
        .filter_map(|raw| {
            let jwk: Jwk = serde_json::from_value(raw.clone()).ok()?;
            let key = DecodingKey::from_jwk(&jwk).ok()?;
            Some((jwk.common.key_id.clone().unwrap_or_default(), key))
        })
        .collect()
}

/// Where the asymmetric verification key comes from.
pub enum PublicKeySource<'a> {
    None,
    Jwks { cache: &'a JwksCache, uri: &'a str },
    Static(&'a DecodingKey),
}

/// Everything needed to check one token's signature.
pub struct VerificationKeys<'a> {
    pub allowed_algorithms: &'a [Algorithm],
    pub shared_secret: Option<&'a [u8]>,
    pub public: PublicKeySource<'a>,
}

impl VerificationKeys<'_> {
    async fn resolve(&self, alg: Algorithm, kid: Option<&str>) -> Result<DecodingKey, JoseError> {
        if is_hmac(alg) {
            return self
                .shared_secret
                .map(DecodingKey::from_secret)
                .ok_or_else(|| JoseError::InvalidKey(format!("no shared secret for {alg:?}")));
        }

        match &self.public {
            PublicKeySource::None => Err(JoseError::InvalidKey(format!("no public key for {alg:?}"))),
            PublicKeySource::Static(key) => Ok((*key).clone()),
            PublicKeySource::Jwks { cache, uri } => {
                let keys = cache.get_keys(uri).await?;
                match kid {
                    Some(kid) => keys
                        .get(kid)
                        .cloned()
                        .ok_or_else(|| JoseError::KeyNotFound(kid.to_string())),
                    None if keys.len() == 1 => keys.into_values().next().ok_or(JoseError::MissingKid),
                    None => Err(JoseError::MissingKid),
                }
            }
        }
    }
}

fn is_hmac(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Parse configured algorithm names; unknown names are configuration errors.
pub fn parse_algorithms(names: &[String]) -> Result<Vec<Algorithm>, JoseError> {
    names
        .iter()
        .map(|name| Algorithm::from_str(name).map_err(|_| JoseError::UnsupportedAlgorithm(name.clone())))
        .collect()
}

/// Read `alg` and `kid` from the raw header so that names the library does
/// not know (`none` included) are reported as disallowed, not malformed.
fn header_algorithm(token: &str, allowed: &[Algorithm]) -> Result<(Algorithm, Option<String>), JoseError> {
    let header_segment = token.split('.').next().ok_or(JoseError::InvalidFormat)?;
    let header = decode_json_segment(header_segment).ok_or(JoseError::InvalidFormat)?;
    let name = header.get("alg").and_then(Value::as_str).ok_or(JoseError::InvalidFormat)?;
    let alg = Algorithm::from_str(name)
        .ok()
        .filter(|alg| allowed.contains(alg))
        .ok_or_else(|| JoseError::AlgorithmNotAllowed(name.to_string()))?;
    let kid = header.get("kid").and_then(Value::as_str).map(String::from);
    Ok((alg, kid))
}

async fn verify_with(
    token: &str,
    keys: &VerificationKeys<'_>,
    configure: impl FnOnce(&mut Validation),
) -> Result<ValidatedClaims, JoseError> {
    if token.split('.').count() != 3 {
        return Err(JoseError::InvalidFormat);
    }
    let (alg, kid) = header_algorithm(token, keys.allowed_algorithms)?;
    let key = keys.resolve(alg, kid.as_deref()).await?;

    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    configure(&mut validation);

    decode::<ValidatedClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JoseError::Signature(e.to_string()))
}

/// Check only the signature and return the payload claims.
pub async fn verify_signature(token: &str, keys: &VerificationKeys<'_>) -> Result<ValidatedClaims, JoseError> {
    verify_with(token, keys, |_| {}).await
}

/// Verify an ID token's signature, issuer, audience, and expiry.
pub async fn verify_id_token(
    token: &str,
    keys: &VerificationKeys<'_>,
    issuer: &str,
    audience: &str,
) -> Result<ValidatedClaims, JoseError> {
    verify_with(token, keys, |validation| {
        validation.validate_exp = true;
        validation.validate_aud = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    })
    .await
}

/// Decode a JWS payload without signature verification.
pub fn decode_unverified(token: &str) -> Result<ValidatedClaims, JoseError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(JoseError::InvalidFormat);
    }
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|_| JoseError::InvalidFormat)?;
    serde_json::from_slice(&payload).map_err(|_| JoseError::InvalidFormat)
}
