//! Settings seam between the server and the embedding application.
//!
//! The lifecycle re-reads settings on every `start()`, so an embedding
//! application can change the port or auth policy between restarts without
//! rebuilding the server.

use pylon_settings::ServerSettings;

/// Source of server settings, consulted once per `start()`.
pub trait SettingsProvider: Send + Sync {
    /// Produce the settings for the next server generation.
    fn load(&self) -> ServerSettings;
}

/// A provider that always returns the same fixed settings.
///
/// Used by tests and by embedding applications that manage configuration
/// themselves.
pub struct StaticSettings {
    settings: ServerSettings,
}

impl StaticSettings {
    /// Wrap a fixed settings value.
    #[must_use]
    pub fn new(settings: ServerSettings) -> Self {
        Self { settings }
    }
}

impl SettingsProvider for StaticSettings {
    fn load(&self) -> ServerSettings {
        self.settings.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
