//! # pylon-core
//!
//! Wire protocol vocabulary for the pylon WebSocket gateway.
//!
//! This crate defines the types every other pylon crate speaks in:
//!
//! - **Session handles**: `SessionHandle`, an opaque UUID v7 newtype keying the registry
//! - **Encodings**: `Encoding` (JSON text / MsgPack binary) plus content-type negotiation
//! - **Envelopes**: `ServerMessage`, the `Hello` and `Event` messages tagged by `messageType`
//! - **Close codes**: `CloseCode`, going-away plus the two application-defined codes

#![deny(unsafe_code)]

pub mod ids;
pub mod wire;

pub use ids::SessionHandle;
pub use wire::{CloseCode, Encoding, HelloAuthentication, ServerMessage, RPC_VERSION, SERVER_VERSION};
