//! # pylon-server
//!
//! Axum HTTP + `WebSocket` session gateway core.
//!
//! - Session registry: a single-mutex map of every live connection
//! - Handshake controller: per-connection encoding negotiation and `Hello`
//! - Broadcast engine: lazy dual-encoding event fan-out to subscribed sessions
//! - Lifecycle manager: `start()`/`stop()` owning a dedicated runtime, with
//!   stop blocking until every session has closed and been notified
//! - Dispatcher and observer seams for the embedding application

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod health;
pub mod observer;
pub mod server;
pub mod websocket;

pub use config::{SettingsProvider, StaticSettings};
pub use dispatch::{IncomingFrame, NoopDispatcher, RequestDispatcher};
pub use errors::ServerError;
pub use observer::{NoopObserver, SessionObserver};
pub use server::PylonServer;
pub use websocket::session::{Session, SessionSnapshot};
