//! Gateway settings types.

use serde::{Deserialize, Serialize};

/// Network and authentication settings for the gateway server.
///
/// Read once per server start; a fresh authentication salt and secret are
/// derived from `password` at that point.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// IPv4 bind address.
    pub host: String,
    /// TCP listen port (0 asks the OS for an ephemeral port).
    pub port: u16,
    /// Password the authentication secret is derived from.
    pub password: String,
    /// Whether clients must authenticate before identifying.
    pub auth_required: bool,
    /// Whether debug-level logging is enabled by default.
    pub debug_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4455,
            password: String::new(),
            auth_required: false,
            debug_enabled: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
