//! Error types for timeline operations.
//!
//! Aggregation itself never fails: malformed relations are logged and
//! dropped. Only caller mistakes against the [`RoomTimeline`] surface here.
//!
//! [`RoomTimeline`]: crate::room::RoomTimeline

use lattice_core::{EventError, EventId};
use thiserror::Error;

/// Errors returned by [`RoomTimeline`](crate::room::RoomTimeline) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelationsError {
    /// The event is not held by this timeline.
    #[error("unknown event {0}")]
    UnknownEvent(EventId),

    /// The event rejected the requested change.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Convenience type alias for timeline results.
pub type Result<T> = std::result::Result<T, RelationsError>;
