//! Relying-party OIDC session tracking.
//!
//! `SessionInfo` is the record and its opaque id codec, `SessionStore` the
//! shared registry consulted by logout handling and by the middleware that
//! admits only requests for active sessions.

pub mod cookie;
pub mod info;
pub mod middleware;
pub mod store;

pub use info::SessionInfo;
pub use store::{SessionSelector, SessionStatus, SessionStore};

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Periodically evict invalidated sessions older than `retention`.
pub fn spawn_eviction_task(
    store: Arc<SessionStore>,
    interval: Duration,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;
            let evicted = store.evict_invalidated_before(now.saturating_sub(retention.as_millis() as u64));
            if evicted > 0 {
                tracing::info!(evicted, "Evicted expired invalidated sessions");
            }
        }
    })
}
