//! # lattice-settings
//!
//! Layered client settings for the Lattice SDK.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **User file**: `~/.lattice/settings.json`
//! 3. **Environment variables**: `LATTICE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<ClientSettings> = OnceLock::new();

/// Get the process-wide settings.
///
/// Loads on first call and caches the result. Falls back to compiled
/// defaults if loading fails.
pub fn get_settings() -> &'static ClientSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ClientSettings::default()
        })
    })
}

/// Install explicit process-wide settings.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ClientSettings) -> std::result::Result<(), ClientSettings> {
    SETTINGS.set(settings)
}
