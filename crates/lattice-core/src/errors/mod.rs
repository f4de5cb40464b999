//! Error types for the event model.
//!
//! [`EventError`] covers the two ways a caller can misuse an event: feeding
//! JSON that is not a protocol event, and driving the send-status state
//! machine backwards. Decryption and transport failures have their own types
//! in [`crate::decryption`] and [`crate::transport`] because they cross the
//! collaborator boundary.

use thiserror::Error;

use crate::event::SendStatus;
use crate::ids::EventId;

/// Errors raised by [`MatrixEvent`](crate::event::MatrixEvent) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A required field was absent or had the wrong JSON type.
    #[error("missing or invalid field `{field}` in event JSON")]
    MissingField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A terminal send status was asked to change.
    #[error("invalid send status transition for {event_id}: {from} -> {to}")]
    InvalidStatusTransition {
        /// The event whose status was being updated.
        event_id: EventId,
        /// Current status.
        from: SendStatus,
        /// Requested status.
        to: SendStatus,
    },
}

/// Convenience type alias for event model results.
pub type Result<T> = std::result::Result<T, EventError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
