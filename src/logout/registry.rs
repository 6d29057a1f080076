//! Registered OpenID provider configurations.

use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;

/// A relying party registered with a provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RelyingPartyClient {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Where logout tokens are POSTed. Clients without one are skipped.
    #[serde(default)]
    pub backchannel_logout_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub issuer: String,
    /// `HS256` signs with each client's secret; `RS256` with `signing_key_pem`.
    #[serde(default = "default_signature_algorithm")]
    pub signature_algorithm: String,
    #[serde(default)]
    pub signing_key_pem: Option<String>,
    #[serde(default)]
    pub clients: Vec<RelyingPartyClient>,
}

fn default_signature_algorithm() -> String {
    "HS256".into()
}

impl ProviderConfig {
    pub fn client(&self, client_id: &str) -> Option<&RelyingPartyClient> {
        self.clients.iter().find(|c| c.client_id == client_id)
    }
}

/// Provider configurations in registration order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<ProviderConfig>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let registry = Self::new();
        for config in configs {
            registry.register(config);
        }
        registry
    }

    /// Add a provider. A provider with the same id is replaced in place.
    pub fn register(&self, config: ProviderConfig) {
        let mut providers = self.providers.write();
        let config = Arc::new(config);
        match providers.iter_mut().find(|p| p.provider_id == config.provider_id) {
            Some(existing) => *existing = config,
            None => providers.push(config),
        }
    }

    pub fn unregister(&self, provider_id: &str) -> bool {
        let mut providers = self.providers.write();
        let before = providers.len();
        providers.retain(|p| p.provider_id != provider_id);
        providers.len() != before
    }

    /// Visit every provider. The callback runs on a snapshot, so it may call
    /// back into the registry.
    pub fn for_each(&self, mut f: impl FnMut(&ProviderConfig)) {
        let snapshot = self.providers.read().clone();
        for provider in &snapshot {
            f(provider);
        }
    }

    /// First provider in registration order matching the predicate.
    pub fn find(&self, mut predicate: impl FnMut(&ProviderConfig) -> bool) -> Option<Arc<ProviderConfig>> {
        self.providers.read().iter().find(|p| predicate(p)).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}
