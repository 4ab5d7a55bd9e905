//! Session lifecycle notifications for the embedding application.

use crate::websocket::session::SessionSnapshot;

/// Receives connect and disconnect notifications.
///
/// Callbacks run on the server's I/O context inside session teardown, so
/// implementations must be cheap and must not block. Every disconnect
/// notification for a server generation has fired by the time `stop()`
/// returns, and none fire afterwards.
pub trait SessionObserver: Send + Sync {
    /// A connection was accepted and its session inserted into the registry.
    fn on_client_connected(&self, _session: &SessionSnapshot) {}

    /// A session was removed from the registry; fires for every session,
    /// including rejected handshakes.
    fn on_client_disconnected(&self, _session: &SessionSnapshot, _close_code: u16) {}

    /// Fires after `on_client_disconnected` when the departing session had
    /// identified.
    fn on_identified_client_disconnected(&self, _session: &SessionSnapshot, _close_code: u16) {}
}

/// An observer that ignores every notification.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
