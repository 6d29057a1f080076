//! Application configuration via environment variables and a registry file.
//!
//! The registry file (`OIDC_REGISTRY_FILE`) is JSON with two arrays:
//! `clients` (relying-party configurations this service acts as) and
//! `providers` (OpenID providers whose logout endpoints it serves).

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::logout::registry::ProviderConfig;

/// One relying-party client configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Configuration id; appears in session ids and in route paths.
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub issuer: String,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default = "default_signature_algorithms")]
    pub signature_algorithms: Vec<String>,
    #[serde(default = "default_key_management_algorithm")]
    pub key_management_algorithm: String,
    #[serde(default = "default_content_encryption_algorithm")]
    pub content_encryption_algorithm: String,
    /// PKCS#8 PEM private key for decrypting JWE responses.
    #[serde(default)]
    pub decryption_key_pem: Option<String>,
    /// SPKI PEM public key used when this client builds JWEs.
    #[serde(default)]
    pub encryption_public_key_pem: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
}

fn default_signature_algorithms() -> Vec<String> {
    vec!["RS256".into()]
}

fn default_key_management_algorithm() -> String {
    "RSA-OAEP-256".into()
}

fn default_content_encryption_algorithm() -> String {
    "A256GCM".into()
}

/// Contents of the registry file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl RegistryFile {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::InvalidRegistry)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::RegistryRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub session_secret: String,
    pub session_https_only: bool,
    /// Accept `application/jwt` UserInfo responses.
    pub jwt_userinfo_enabled: bool,
    pub http_timeout: Duration,
    /// Permit `http://` UserInfo endpoints. Tests only.
    pub allow_insecure_endpoints: bool,
    /// Interval of the invalidated-set eviction task.
    pub eviction_interval: Duration,
    /// Invalidated entries older than this are evicted.
    pub invalidated_retention: Duration,
    pub clients: Vec<ClientConfig>,
    pub providers: Vec<ProviderConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required: `SESSION_SECRET`. The registry file is optional; without it
    /// the service starts with no clients and no providers.
    pub fn from_env() -> Result<Self, ConfigError> {
        let registry = match env::var("OIDC_REGISTRY_FILE") {
            Ok(path) if !path.is_empty() => RegistryFile::load(Path::new(&path))?,
            _ => RegistryFile::default(),
        };

        Ok(Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3001),
            session_secret: required_env("SESSION_SECRET")?,
            session_https_only: env_flag("SESSION_HTTPS_ONLY"),
            jwt_userinfo_enabled: env_flag("OIDC_JWT_USERINFO_ENABLED"),
            http_timeout: Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS", 10)),
            allow_insecure_endpoints: env_flag("ALLOW_INSECURE_ENDPOINTS"),
            eviction_interval: Duration::from_secs(env_u64("EVICTION_INTERVAL_SECS", 300)),
            invalidated_retention: Duration::from_secs(env_u64("INVALIDATED_RETENTION_SECS", 86_400)),
            clients: registry.clients,
            providers: registry.providers,
        })
    }
}

/// Configuration for testing: no clients, no providers, plain HTTP allowed.
impl Config {
    pub fn test_default() -> Self {
        Self {
            port: 3001,
            session_secret: "test-secret-key".into(),
            session_https_only: false,
            jwt_userinfo_enabled: true,
            http_timeout: Duration::from_secs(5),
            allow_insecure_endpoints: true,
            eviction_interval: Duration::from_secs(300),
            invalidated_retention: Duration::from_secs(86_400),
            clients: Vec::new(),
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("failed to read registry file {path}: {source}")]
    RegistryRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid registry file: {0}")]
    InvalidRegistry(#[source] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("invalid client configuration {id}: {source}")]
    InvalidClient {
        id: String,
        #[source]
        source: crate::jose::JoseError,
    },
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv(key.into()))
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| v == "true" || v == "1" || v == "True")
        .unwrap_or(false)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
