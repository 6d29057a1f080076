//! OIDC session handler.
//!
//! Relying-party side: verifies ID tokens, tracks sessions per issuer, and
//! honours backchannel logout tokens by invalidating the sessions they name.
//! Provider side: answers logout-endpoint requests by notifying every
//! registered relying party.

pub mod audit;
pub mod client;
pub mod config;
pub mod error;
pub mod jose;
pub mod logout;
pub mod routes;
pub mod session;
pub mod types;
pub mod userinfo;

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::client::OidcClient;
use crate::config::{Config, ConfigError};
use crate::error::AppError;
use crate::jose::jws::JwksCache;
use crate::logout::{BackchannelLogoutDispatcher, HttpLogoutNotifier, ProviderRegistry};
use crate::session::SessionStore;
use crate::session::middleware::{SessionLayer, session_middleware};

/// Shared application state available to all route handlers.
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub jwks_cache: Arc<JwksCache>,
    pub store: Arc<SessionStore>,
    pub clients: HashMap<String, OidcClient>,
    pub dispatcher: BackchannelLogoutDispatcher<HttpLogoutNotifier>,
    pub session_layer: Arc<SessionLayer>,
}

impl AppState {
    /// Build state from configuration. Fails when any client's algorithms
    /// or key material do not parse.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        let jwks_cache = Arc::new(JwksCache::new(http_client.clone()));
        let store = Arc::new(SessionStore::new());

        let mut clients = HashMap::with_capacity(config.clients.len());
        for client_config in &config.clients {
            let client = OidcClient::from_config(client_config.clone())?;
            clients.insert(client.id().to_string(), client);
        }

        let registry = Arc::new(ProviderRegistry::from_configs(config.providers.clone()));
        let notifier = HttpLogoutNotifier::new(http_client.clone(), config.http_timeout);
        let dispatcher = BackchannelLogoutDispatcher::new(registry, notifier);

        let session_layer = Arc::new(SessionLayer {
            store: store.clone(),
            secret: config.session_secret.clone(),
            https_only: config.session_https_only,
        });

        tracing::info!(
            clients = clients.len(),
            providers = config.providers.len(),
            "OIDC session handler configured"
        );

        Ok(Self {
            config,
            http_client,
            jwks_cache,
            store,
            clients,
            dispatcher,
            session_layer,
        })
    }

    pub fn client(&self, config_id: &str) -> Result<&OidcClient, AppError> {
        self.clients
            .get(config_id)
            .ok_or_else(|| AppError::UnknownClient(config_id.to_string()))
    }
}

/// Build the Axum router with all middleware and routes.
///
/// Requests no route claims fall through to the provider logout handler,
/// which answers for any registered `{provider_id}/end_session` or
/// `{provider_id}/logout` path.
pub fn create_app(state: Arc<AppState>) -> Router {
    let session_layer = state.session_layer.clone();

    let auth_routes = Router::new()
        .route("/{config_id}/session", post(routes::session::create_session))
        .route("/me", get(routes::me::me))
        .route("/logout", post(routes::logout::logout));

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/auth", auth_routes)
        .route(
            "/backchannel_logout/{config_id}",
            post(routes::backchannel::backchannel_logout),
        )
        .fallback(routes::end_session::end_session)
        .layer(from_fn(move |req, next| {
            let layer = session_layer.clone();
            session_middleware(layer, req, next)
        }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
