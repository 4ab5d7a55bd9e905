//! WebSocket session management, handshake, and event broadcasting.

pub mod broadcast;
pub mod handshake;
pub mod registry;
pub mod session;
