//! Message envelopes, encodings, and close codes for the client protocol.
//!
//! Every message on the wire is an envelope tagged by `messageType`. A session
//! receives envelopes in exactly one encoding, negotiated from the upgrade
//! request's `Content-Type` header and fixed for the connection's lifetime:
//! JSON as text frames, or MsgPack (string-keyed maps, the same value graph)
//! as binary frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server software version reported in `Hello`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol revision reported in `Hello`.
pub const RPC_VERSION: u32 = 1;

/// The wire serialization a session uses for all messages, fixed at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// JSON text frames (the default).
    #[default]
    Json,
    /// MsgPack binary frames.
    MsgPack,
}

impl Encoding {
    /// Negotiate an encoding from the upgrade request's `Content-Type` header.
    ///
    /// An absent (empty) header selects JSON. Any other value than the two
    /// supported media types rejects the handshake.
    #[must_use]
    pub fn from_content_type(value: &str) -> Option<Self> {
        match value {
            "" | "application/json" => Some(Self::Json),
            "application/msgpack" => Some(Self::MsgPack),
            _ => None,
        }
    }
}

/// Authentication material included in `Hello` when the server requires auth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuthentication {
    /// Per-session random value, issued once and consumed by the identify step.
    pub challenge: String,
    /// Process-wide salt for the current server generation.
    pub salt: String,
}

/// Outbound message envelopes, tagged on the wire by `messageType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType")]
pub enum ServerMessage {
    /// First message sent to a client after a successful handshake.
    #[serde(rename_all = "camelCase")]
    Hello {
        /// Server software version.
        obs_web_socket_version: String,
        /// Wire protocol revision clients must speak.
        rpc_version: u32,
        /// Present only when the server requires authentication.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        authentication: Option<HelloAuthentication>,
    },
    /// An application event fanned out to subscribed sessions.
    #[serde(rename_all = "camelCase")]
    Event {
        /// Application-defined event name.
        event_type: String,
        /// Event payload; omitted unless the publisher supplied a JSON object.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_data: Option<Value>,
    },
}

impl ServerMessage {
    /// Build a `Hello` for the current server version and protocol revision.
    #[must_use]
    pub fn hello(authentication: Option<HelloAuthentication>) -> Self {
        Self::Hello {
            obs_web_socket_version: SERVER_VERSION.to_owned(),
            rpc_version: RPC_VERSION,
            authentication,
        }
    }

    /// Build an `Event`. Non-object payloads are dropped rather than sent.
    #[must_use]
    pub fn event(event_type: impl Into<String>, event_data: Option<Value>) -> Self {
        Self::Event {
            event_type: event_type.into(),
            event_data: event_data.filter(Value::is_object),
        }
    }
}

/// Close status codes the gateway itself initiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Graceful server shutdown (RFC 6455 "going away").
    GoingAway,
    /// Handshake rejected: the request declared an unsupported content type.
    InvalidContentType,
    /// The session was administratively invalidated.
    SessionInvalidated,
}

impl CloseCode {
    /// Numeric status code sent in the close frame.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::GoingAway => 1001,
            Self::InvalidContentType => 4000,
            Self::SessionInvalidated => 4001,
        }
    }

    /// Human-readable close reason sent alongside the code.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::GoingAway => "Server stopping.",
            Self::InvalidContentType => {
                "Your HTTP `Content-Type` header specifies an invalid encoding type."
            }
            Self::SessionInvalidated => "Your session has been invalidated.",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
