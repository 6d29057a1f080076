//! Runtime view of a relying-party client: configuration plus parsed key
//! material.

use jsonwebtoken::Algorithm;

use crate::config::{ClientConfig, ConfigError};
use crate::jose::jwe::JweCodec;
use crate::jose::jws::{JwksCache, PublicKeySource, VerificationKeys, parse_algorithms};

#[derive(Debug, Clone)]
pub struct OidcClient {
    config: ClientConfig,
    allowed_algorithms: Vec<Algorithm>,
    jwe: JweCodec,
}

impl OidcClient {
    /// Parse algorithm names and PEM keys. Any failure is a configuration
    /// error for this client.
    pub fn from_config(config: ClientConfig) -> Result<Self, ConfigError> {
        let invalid = |source| ConfigError::InvalidClient {
            id: config.id.clone(),
            source,
        };
        let allowed_algorithms = parse_algorithms(&config.signature_algorithms).map_err(invalid)?;
        let mut jwe = JweCodec::from_pem(
            &config.key_management_algorithm,
            &config.content_encryption_algorithm,
            config.decryption_key_pem.as_deref(),
            config.encryption_public_key_pem.as_deref(),
        )
        .map_err(invalid)?;
        if let Some(kid) = &config.key_id {
            jwe = jwe.with_key_id(kid.clone());
        }

        Ok(Self {
            config,
            allowed_algorithms,
            jwe,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    pub fn userinfo_endpoint(&self) -> Option<&str> {
        self.config.userinfo_endpoint.as_deref()
    }

    pub fn jwe(&self) -> &JweCodec {
        &self.jwe
    }

    /// Keys for verifying tokens issued to this client: the client secret for
    /// `HS*`, the provider JWKS for everything else.
    pub fn verification_keys<'a>(&'a self, jwks: &'a JwksCache) -> VerificationKeys<'a> {
        let public = match &self.config.jwks_uri {
            Some(uri) => PublicKeySource::Jwks {
                cache: jwks,
                uri: uri.as_str(),
            },
            None => PublicKeySource::None,
        };
        let shared_secret = Some(self.config.client_secret.as_bytes()).filter(|s| !s.is_empty());
        VerificationKeys {
            allowed_algorithms: &self.allowed_algorithms,
            shared_secret,
            public,
        }
    }
}
