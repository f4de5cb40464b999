//! # lattice-relations
//!
//! Relation aggregation and thread reconstruction.
//!
//! - [`RelationBucket`]: all relations of one kind and event type targeting
//!   one origin, with reaction grouping and edit selection
//! - [`RelationIndex`]: origin event ID → buckets, and event routing
//! - [`Thread`]: reply timeline, count, last-reply pointer and participation
//! - [`RoomTimeline`]: owns a room's events and fans ingestion, redaction and
//!   send-status changes out to the index and threads
//!
//! Aggregates reflect events in delivery order. Malformed relations are
//! logged and dropped; nothing here fails the ingestion pipeline.

#![deny(unsafe_code)]

pub mod bucket;
pub mod errors;
pub mod index;
pub mod notifications;
pub mod room;
pub mod thread;

pub use bucket::{AnnotationGroup, RelationBucket};
pub use errors::{RelationsError, Result};
pub use index::RelationIndex;
pub use notifications::{RelationsNotification, ThreadNotification, ThreadNotificationKind};
pub use room::RoomTimeline;
pub use thread::{Thread, ThreadContext, ThreadFetchResult, ThreadState};
