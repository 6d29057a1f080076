//! JWE compact serialization with RSA-OAEP key management and AES-GCM
//! content encryption.
//!
//! Token layout: `header.encrypted_key.iv.ciphertext.tag`, each part
//! base64url without padding. The AAD is the ASCII of the encoded header.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

use super::{JoseError, decode_json_segment};

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// `alg` header values accepted for key management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyManagementAlgorithm {
    RsaOaep,
    RsaOaep256,
}

impl KeyManagementAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
        }
    }

    fn padding(self) -> Oaep {
        match self {
            Self::RsaOaep => Oaep::new::<sha1::Sha1>(),
            Self::RsaOaep256 => Oaep::new::<sha2::Sha256>(),
        }
    }
}

impl FromStr for KeyManagementAlgorithm {
    type Err = JoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA-OAEP" => Ok(Self::RsaOaep),
            "RSA-OAEP-256" => Ok(Self::RsaOaep256),
            other => Err(JoseError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for KeyManagementAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `enc` header values accepted for content encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncryptionAlgorithm {
    A128Gcm,
    A256Gcm,
}

impl ContentEncryptionAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    fn key_len(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A256Gcm => 32,
        }
    }

    fn seal(self, cek: &[u8], iv: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, JoseError> {
        let payload = Payload { msg: plaintext, aad };
        let nonce = Nonce::from_slice(iv);
        let sealed = match self {
            Self::A128Gcm => Aes128Gcm::new_from_slice(cek)
                .map_err(|e| JoseError::Crypto(e.to_string()))?
                .encrypt(nonce, payload),
            Self::A256Gcm => Aes256Gcm::new_from_slice(cek)
                .map_err(|e| JoseError::Crypto(e.to_string()))?
                .encrypt(nonce, payload),
        };
        sealed.map_err(|_| JoseError::Crypto(format!("{} encryption failed", self.name())))
    }

    fn open(self, cek: &[u8], iv: &[u8], aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, JoseError> {
        let payload = Payload { msg: sealed, aad };
        let nonce = Nonce::from_slice(iv);
        let opened = match self {
            Self::A128Gcm => Aes128Gcm::new_from_slice(cek)
                .map_err(|e| JoseError::Crypto(e.to_string()))?
                .decrypt(nonce, payload),
            Self::A256Gcm => Aes256Gcm::new_from_slice(cek)
                .map_err(|e| JoseError::Crypto(e.to_string()))?
                .decrypt(nonce, payload),
        };
        opened.map_err(|_| JoseError::Crypto(format!("{} decryption failed", self.name())))
    }
}

impl FromStr for ContentEncryptionAlgorithm {
    type Err = JoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A128GCM" => Ok(Self::A128Gcm),
            "A256GCM" => Ok(Self::A256Gcm),
            other => Err(JoseError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for ContentEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Algorithms a decrypting party will accept in an inbound JWE header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmConstraints {
    pub key_management: Vec<KeyManagementAlgorithm>,
    pub content_encryption: Vec<ContentEncryptionAlgorithm>,
}

/// Key material and algorithms for one party.
#[derive(Clone)]
pub struct JweCodec {
    key_management: KeyManagementAlgorithm,
    content_encryption: ContentEncryptionAlgorithm,
    public_key: Option<RsaPublicKey>,
    private_key: Option<RsaPrivateKey>,
    key_id: Option<String>,
    constraints: AlgorithmConstraints,
}

impl fmt::Debug for JweCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JweCodec")
            .field("key_management", &self.key_management)
            .field("content_encryption", &self.content_encryption)
            .field("has_public_key", &self.public_key.is_some())
            .field("has_private_key", &self.private_key.is_some())
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl JweCodec {
    /// Codec whose decrypt allow-list is exactly the configured pair.
    pub fn new(
        key_management: KeyManagementAlgorithm,
        content_encryption: ContentEncryptionAlgorithm,
    ) -> Self {
        Self {
            key_management,
            content_encryption,
            public_key: None,
            private_key: None,
            key_id: None,
            constraints: AlgorithmConstraints {
                key_management: vec![key_management],
                content_encryption: vec![content_encryption],
            },
        }
    }

    /// Private key for decryption. Also supplies the public key when none
    /// has been set.
    pub fn with_private_key(mut self, key: RsaPrivateKey) -> Self {
        if self.public_key.is_none() {
            self.public_key = Some(key.to_public_key());
        }
        self.private_key = Some(key);
        self
    }

    /// Recipient public key used when building.
    pub fn with_public_key(mut self, key: RsaPublicKey) -> Self {
        self.public_key = Some(key);
        self
    }

    pub fn with_key_id(mut self, kid: impl Into<String>) -> Self {
        self.key_id = Some(kid.into());
        self
    }

    pub fn with_constraints(mut self, constraints: AlgorithmConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Build from configuration strings and PKCS#8 / SPKI PEM keys.
    pub fn from_pem(
        key_management: &str,
        content_encryption: &str,
        private_key_pem: Option<&str>,
        public_key_pem: Option<&str>,
    ) -> Result<Self, JoseError> {
        let mut codec = Self::new(key_management.parse()?, content_encryption.parse()?);
        if let Some(pem) = public_key_pem {
            let key = RsaPublicKey::from_public_key_pem(pem)
                .map_err(|e| JoseError::InvalidKey(e.to_string()))?;
            codec = codec.with_public_key(key);
        }
        if let Some(pem) = private_key_pem {
            let key = RsaPrivateKey::from_pkcs8_pem(pem)
                .map_err(|e| JoseError::InvalidKey(e.to_string()))?;
            codec = codec.with_private_key(key);
        }
        Ok(codec)
    }

    pub fn key_management(&self) -> KeyManagementAlgorithm {
        self.key_management
    }

    pub fn content_encryption(&self) -> ContentEncryptionAlgorithm {
        self.content_encryption
    }

    /// Encrypt a signed token into a compact JWE.
    ///
    /// The recipient key is used as-is, without validating its chain. The
    /// result is decrypted again with the configured private key before it
    /// is returned; a failed round trip fails the build.
    pub fn build(&self, jws: &str, signature_algorithm: &str) -> Result<String, JoseError> {
        let Some(public_key) = &self.public_key else {
            return Err(JoseError::MissingKeyManagementKey(format!(
                "no public key configured for {} (signature algorithm {})",
                self.key_management, signature_algorithm
            )));
        };

        let mut header = Map::new();
        header.insert("alg".into(), json!(self.key_management.name()));
        header.insert("enc".into(), json!(self.content_encryption.name()));
        if let Some(kid) = &self.key_id {
            header.insert("kid".into(), json!(kid));
        }
        header.insert("typ".into(), json!("JWT"));
        header.insert("cty".into(), json!("JWT"));
        let header_b64 = URL_SAFE_NO_PAD.encode(Value::Object(header).to_string());

        let mut cek = vec![0u8; self.content_encryption.key_len()];
        OsRng.fill_bytes(&mut cek);
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let encrypted_key = public_key
            .encrypt(&mut OsRng, self.key_management.padding(), &cek)
            .map_err(|e| JoseError::Crypto(e.to_string()))?;

        let mut sealed =
            self.content_encryption
                .seal(&cek, &iv, header_b64.as_bytes(), jws.as_bytes())?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        let jwe = [
            header_b64,
            URL_SAFE_NO_PAD.encode(encrypted_key),
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(&sealed),
            URL_SAFE_NO_PAD.encode(tag),
        ]
        .join(".");

        let roundtrip = self.decrypt(&jwe)?;
        if roundtrip != jws {
            return Err(JoseError::Crypto("JWE self-check produced a different payload".into()));
        }
        tracing::debug!(
            alg = self.key_management.name(),
            enc = self.content_encryption.name(),
            "Built JWE"
        );

        Ok(jwe)
    }

    /// Decrypt a compact JWE and return its plaintext payload.
    ///
    /// The header's `alg` and `enc` must both be in the allow-lists; this is
    /// checked before any key operation.
    pub fn decrypt(&self, jwe: &str) -> Result<String, JoseError> {
        let parts: Vec<&str> = jwe.trim().split('.').collect();
        if parts.len() != 5 {
            return Err(JoseError::InvalidFormat);
        }

        let header = decode_json_segment(parts[0]).ok_or(JoseError::InvalidFormat)?;
        let alg_name = header.get("alg").and_then(Value::as_str).ok_or(JoseError::InvalidFormat)?;
        let enc_name = header.get("enc").and_then(Value::as_str).ok_or(JoseError::InvalidFormat)?;

        let alg = alg_name
            .parse::<KeyManagementAlgorithm>()
            .ok()
            .filter(|a| self.constraints.key_management.contains(a))
            .ok_or_else(|| JoseError::AlgorithmNotAllowed(alg_name.to_string()))?;
        let enc = enc_name
            .parse::<ContentEncryptionAlgorithm>()
            .ok()
            .filter(|e| self.constraints.content_encryption.contains(e))
            .ok_or_else(|| JoseError::AlgorithmNotAllowed(enc_name.to_string()))?;

        if header.contains_key("zip") {
            return Err(JoseError::UnsupportedAlgorithm("zip".into()));
        }

        let Some(private_key) = &self.private_key else {
            return Err(JoseError::MissingKeyManagementKey(format!(
                "no private key configured for {alg}"
            )));
        };

        let decode = |part: &str| {
            URL_SAFE_NO_PAD
                .decode(part)
                .map_err(|_| JoseError::InvalidFormat)
        };
        let encrypted_key = decode(parts[1])?;
        let iv = decode(parts[2])?;
        let mut sealed = decode(parts[3])?;
        let tag = decode(parts[4])?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(JoseError::Crypto("invalid IV or authentication tag length".into()));
        }

        let cek = private_key
            .decrypt(alg.padding(), &encrypted_key)
            .map_err(|e| JoseError::Crypto(e.to_string()))?;
        if cek.len() != enc.key_len() {
            return Err(JoseError::Crypto(format!(
                "content encryption key has {} bytes, {} requires {}",
                cek.len(),
                enc,
                enc.key_len()
            )));
        }

        sealed.extend_from_slice(&tag);
        let plaintext = enc.open(&cek, &iv, parts[0].as_bytes(), &sealed)?;
        String::from_utf8(plaintext).map_err(|_| JoseError::Crypto("JWE payload is not UTF-8".into()))
    }
}
