//! Typed publish/subscribe channel for session transitions.
//! Each kernel owns its own channel instance; nothing here is a module-level
//! singleton, so tests can run several kernels side by side. Built on
//! tokio broadcast: no buffering or replay, late subscribers miss past
//! events, and a subscriber that lags past the channel capacity drops the
//! oldest events rather than blocking the kernel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::AuthError;

/// Stable event codes carried inside `AuthEvent::Error`.
pub mod codes {
    pub const BOOTSTRAP_FAIL: &str = "bootstrap_fail";
    pub const TOKEN_REFRESH_FAILED: &str = "token_refresh_failed";
    pub const TOKEN_DECODE_FAILED: &str = "token_decode_failed";
    pub const SESSION_EXPIRED: &str = "session_expired";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    /// Claims bootstrap completed; carries the snapshot version it produced.
    BootstrapOk { claims_version: u64 },
    BootstrapFail { error: AuthError },
    /// A new bearer token replaced the previous one (scheduled renewal or
    /// explicit refresh).
    TokenRefreshed,
    IdleLocked,
    SignedOut,
    /// Structured failure surfaced to passive observers.
    Error { code: String, error: AuthError },
    /// Transport-level failure from the HTTP adapter.
    NetworkError { url: String, error: String },
}

impl AuthEvent {
    /// Stable wire name, used by consumers that filter by event name.
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::BootstrapOk { .. } => "bootstrap_ok",
            AuthEvent::BootstrapFail { .. } => "bootstrap_fail",
            AuthEvent::TokenRefreshed => "token_refreshed",
            AuthEvent::IdleLocked => "idle_locked",
            AuthEvent::SignedOut => "signed_out",
            AuthEvent::Error { .. } => "auth:error",
            AuthEvent::NetworkError { .. } => "network_error",
        }
    }
}

/// Per-kernel broadcast channel handle.
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Publish to whoever is currently subscribed. A send with no receivers
    /// is not an error; events are fire-and-forget.
    pub fn publish(&self, event: AuthEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(n) => tracing::debug!(target: "sessium::events", event = name, receivers = n, "publish"),
            Err(_) => tracing::debug!(target: "sessium::events", event = name, "publish with no subscribers"),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_current_subscribers_only() {
        let ch = EventChannel::new(8);
        // No subscribers yet: event is dropped, not an error
        ch.publish(AuthEvent::TokenRefreshed);

        let mut rx = ch.subscribe();
        ch.publish(AuthEvent::IdleLocked);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.name(), "idle_locked");

        // A late subscriber does not see the earlier event
        let mut late = ch.subscribe();
        ch.publish(AuthEvent::SignedOut);
        let got_late = late.recv().await.unwrap();
        assert_eq!(got_late.name(), "signed_out");
    }

    #[test]
    fn names_are_stable() {
        assert_eq!(AuthEvent::BootstrapOk { claims_version: 1 }.name(), "bootstrap_ok");
        let err = crate::error::AuthError::bootstrap("bootstrap_fail", "nope");
        assert_eq!(AuthEvent::BootstrapFail { error: err.clone() }.name(), "bootstrap_fail");
        assert_eq!(AuthEvent::Error { code: codes::BOOTSTRAP_FAIL.into(), error: err }.name(), "auth:error");
    }
}
