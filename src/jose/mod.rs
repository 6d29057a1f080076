//! Compact JOSE token handling: shape detection, JWE, and JWS verification.

pub mod jwe;
pub mod jws;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};

/// Claims extracted from a response or token; all-or-nothing.
pub type ValidatedClaims = Map<String, Value>;

/// What a token-bearing string turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenEnvelope {
    Plain(ValidatedClaims),
    SignedJws(String),
    EncryptedJwe(String),
}

impl TokenEnvelope {
    /// Classify by structure. `None` when the input is none of the three.
    pub fn classify(input: &str) -> Option<Self> {
        let input = input.trim();
        if is_jwe(input) {
            return Some(Self::EncryptedJwe(input.to_string()));
        }
        if is_jws(input) {
            return Some(Self::SignedJws(input.to_string()));
        }
        serde_json::from_str::<ValidatedClaims>(input)
            .ok()
            .map(Self::Plain)
    }
}

/// Five segments with a JSON header naming an `enc`.
pub fn is_jwe(input: &str) -> bool {
    let parts: Vec<&str> = input.split('.').collect();
    parts.len() == 5
        && decode_json_segment(parts[0]).is_some_and(|h| h.contains_key("alg") && h.contains_key("enc"))
}

/// Three segments with a JSON header naming an `alg` and a decodable payload.
pub fn is_jws(input: &str) -> bool {
    let parts: Vec<&str> = input.split('.').collect();
    parts.len() == 3
        && decode_json_segment(parts[0]).is_some_and(|h| h.contains_key("alg") && !h.contains_key("enc"))
        && URL_SAFE_NO_PAD.decode(parts[1]).is_ok()
}

/// Decode one base64url segment holding a JSON object.
pub(crate) fn decode_json_segment(segment: &str) -> Option<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[derive(Debug, thiserror::Error)]
pub enum JoseError {
    #[error("Invalid token format")]
    InvalidFormat,

    #[error("Token missing kid header")]
    MissingKid,

    #[error("Signing key not found for kid: {0}")]
    KeyNotFound(String),

    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    #[error("Signature validation failed: {0}")]
    Signature(String),

    #[error("Algorithm not allowed: {0}")]
    AlgorithmNotAllowed(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Missing key management key: {0}")]
    MissingKeyManagementKey(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("JWE payload is itself a JWE")]
    NestedJwe,
}
