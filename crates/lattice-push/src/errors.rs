//! Error types for push rule evaluation.

use thiserror::Error;

/// Errors that can occur while compiling push rule patterns.
#[derive(Debug, Error)]
pub enum PushError {
    /// A glob pattern did not translate into a valid regular expression.
    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidGlob {
        /// The glob as written in the rule.
        pattern: String,
        /// Why the translated expression was rejected.
        #[source]
        source: regex::Error,
    },

    /// A display name did not produce a valid regular expression.
    #[error("invalid display name pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// Convenience alias for push results.
pub type Result<T> = std::result::Result<T, PushError>;
