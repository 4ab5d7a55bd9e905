//! The request dispatcher seam.
//!
//! The gateway owns transport, handshake, and fan-out; interpreting what the
//! client says is the embedding application's business. Every data frame a
//! non-closing session receives is handed to the installed
//! [`RequestDispatcher`] together with the session and the current server
//! auth material. The dispatcher decides when to call
//! [`Session::mark_identified`](crate::Session::mark_identified) and
//! [`Session::set_event_subscriptions`](crate::Session::set_event_subscriptions),
//! and sends any replies through the session's outbound path.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use pylon_auth::ServerAuth;

use crate::websocket::session::Session;

/// A raw data frame received from a client, in the session's encoding.
#[derive(Debug, Clone)]
pub enum IncomingFrame {
    /// A text frame (JSON sessions).
    Text(String),
    /// A binary frame (MsgPack sessions).
    Binary(Vec<u8>),
}

/// Interprets client messages on behalf of the embedding application.
///
/// Called on the server's I/O context, one invocation at a time per session
/// (frames from one connection are dispatched in receive order).
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    /// Handle one data frame from an open, non-closing session.
    ///
    /// `auth` carries the per-start salt and derived secret for verifying
    /// identify attempts against the session's stored challenge.
    async fn on_message(&self, session: &Arc<Session>, auth: &ServerAuth, frame: IncomingFrame);
}

/// A dispatcher that drops every message.
///
/// With this installed no session can ever identify, so broadcasts reach
/// nobody; useful for tests and transport-only deployments.
pub struct NoopDispatcher;

#[async_trait]
impl RequestDispatcher for NoopDispatcher {
    async fn on_message(&self, session: &Arc<Session>, _auth: &ServerAuth, frame: IncomingFrame) {
        let kind = match frame {
            IncomingFrame::Text(_) => "text",
            IncomingFrame::Binary(_) => "binary",
        };
        trace!(handle = %session.handle, kind, "no dispatcher installed, dropping frame");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
