//! # lattice-core
//!
//! Foundation types for the Lattice client SDK.
//!
//! - **Branded IDs**: [`EventId`], [`RoomId`], [`UserId`]
//! - **Events**: [`MatrixEvent`] behind the shared [`SharedEvent`] handle,
//!   with its send-status and decryption state machines
//! - **Relations**: [`Relation`] descriptors and server [`BundledAggregations`]
//! - **Collaborators**: [`Transport`], [`Decryptor`], [`RoomState`]
//! - **Content helpers** and **logging** setup

#![deny(unsafe_code)]

pub mod constants;
pub mod content;
pub mod decryption;
pub mod errors;
pub mod event;
pub mod ids;
pub mod logging;
pub mod relation;
pub mod room_state;
pub mod transport;

pub use decryption::{ClearEvent, DecryptionError, Decryptor};
pub use errors::EventError;
pub use event::{EncryptionState, MatrixEvent, SendStatus, SharedEvent};
pub use ids::{EventId, RoomId, UserId};
pub use relation::{BundledAggregations, BundledReplacement, BundledThreadSummary, Relation, RelationType};
pub use room_state::{RoomMember, RoomState};
pub use transport::{
    Direction, Method, RelationsChunk, RelationsRequestOpts, Transport, TransportError,
    TransportRequest, fetch_relations,
};
