//! Notifications emitted by buckets and threads.
//!
//! Each aggregator owns a `tokio::sync::broadcast` channel; consumers call
//! `subscribe()` and receive every notification sent after that point.
//! Sending with no subscribers is not an error.

use lattice_core::{EventId, RelationType, SharedEvent};

/// Change to a [`RelationBucket`](crate::bucket::RelationBucket).
#[derive(Clone, Debug)]
pub enum RelationsNotification {
    /// A member was inserted.
    Added(SharedEvent),
    /// A member was removed (confirmed redaction or cancelled send).
    Removed(SharedEvent),
    /// The bucket has both its origin and a first member. Sent once.
    Created {
        /// The origin event.
        origin: SharedEvent,
        /// Relation kind of the bucket.
        relation_type: RelationType,
        /// Event type of the bucket.
        event_type: String,
    },
    /// A local echo member was swapped for the server's copy.
    LocalEchoReplaced {
        /// Provisional ID of the echo.
        local_id: EventId,
        /// The confirmed event now holding the echo's place.
        event: SharedEvent,
    },
    /// The published replacement of the origin changed.
    Replaced {
        /// The origin event.
        origin: SharedEvent,
        /// The new replacement, `None` when the last one went away.
        replacement: Option<SharedEvent>,
    },
}

/// What changed in a thread.
#[derive(Clone, Debug)]
pub enum ThreadNotificationKind {
    /// The thread was created in its room.
    New,
    /// Counters, pointer or membership changed.
    Update,
    /// The last-reply pointer advanced to this reply.
    NewReply(SharedEvent),
}

/// Change to a [`Thread`](crate::thread::Thread).
#[derive(Clone, Debug)]
pub struct ThreadNotification {
    /// Root event ID of the thread.
    pub thread_id: EventId,
    /// What happened.
    pub kind: ThreadNotificationKind,
}
