//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A layer could not be read or did not fit the settings schema.
    #[error("failed to load settings: {0}")]
    Figment(#[from] figment::Error),
    /// A settings value was out of range.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
