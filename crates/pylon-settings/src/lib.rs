//! # pylon-settings
//!
//! Configuration loading for the pylon gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ServerSettings::default()`]
//! 2. **User file**: `~/.pylon/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PYLON_*` overrides (highest priority)
//!
//! The lifecycle manager re-reads settings on every server start, so edits
//! take effect on the next start without a process restart.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::ServerSettings;
