//! Backchannel logout: the provider registry and dispatcher on the OP side,
//! logout-token delivery, and logout-token handling on the RP side.

pub mod dispatcher;
pub mod notifier;
pub mod receiver;
pub mod registry;

pub use dispatcher::{BackchannelLogoutDispatcher, LogoutRequest};
pub use notifier::{HttpLogoutNotifier, LogoutNotifier, LogoutOutcome};
pub use registry::{ProviderConfig, ProviderRegistry, RelyingPartyClient};
