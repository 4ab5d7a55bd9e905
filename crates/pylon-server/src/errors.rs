//! Server error types.
//!
//! Only `start()` surfaces errors to the caller. Everything that goes wrong
//! on a single connection (handshake rejection, full outbound queue, close
//! during shutdown) is logged and handled locally so one bad session never
//! aborts a bulk operation.

use thiserror::Error;

/// Errors returned by the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The `host:port` the server tried to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The dedicated I/O runtime could not be built or configured.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
