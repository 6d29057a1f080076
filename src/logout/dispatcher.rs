//! Routes OP logout requests to the matching provider's notifier.

use std::sync::Arc;

use super::notifier::{LogoutNotifier, LogoutOutcome};
use super::registry::ProviderRegistry;

/// One logout-endpoint request, reduced to what dispatch needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogoutRequest<'a> {
    pub path: &'a str,
    pub id_token_hint: Option<&'a str>,
    pub principal: Option<&'a str>,
}

pub struct BackchannelLogoutDispatcher<N> {
    registry: Arc<ProviderRegistry>,
    notifier: N,
}

impl<N: LogoutNotifier> BackchannelLogoutDispatcher<N> {
    pub fn new(registry: Arc<ProviderRegistry>, notifier: N) -> Self {
        Self { registry, notifier }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Notify relying parties of the first provider whose logout endpoint
    /// the path names. `None` when no provider matches.
    pub async fn logout(&self, request: &LogoutRequest<'_>) -> Option<LogoutOutcome> {
        let Some(provider) = self
            .registry
            .find(|p| is_logout_endpoint(request.path, &p.provider_id))
        else {
            tracing::debug!(path = request.path, "No OIDC provider matches the logout request");
            return None;
        };

        tracing::debug!(provider = %provider.provider_id, path = request.path, "Dispatching backchannel logout");
        Some(
            self.notifier
                .send_logout_requests(&provider, request.principal, request.id_token_hint)
                .await,
        )
    }
}

/// `…/{provider_id}/end_session` or `…/{provider_id}/logout`.
pub fn is_logout_endpoint(path: &str, provider_id: &str) -> bool {
    path.ends_with(&format!("/{provider_id}/end_session")) || path.ends_with(&format!("/{provider_id}/logout"))
}
