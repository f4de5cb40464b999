//! Decryption collaborator interface.
//!
//! The SDK never decrypts anything itself. A [`Decryptor`] turns a ciphertext
//! event into a [`ClearEvent`]; the event entity tracks the pending state so
//! a second request for the same event joins the in-flight attempt instead of
//! starting another one (see [`MatrixEvent::attempt_decryption`]).
//!
//! [`MatrixEvent::attempt_decryption`]: crate::event::MatrixEvent::attempt_decryption

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::MatrixEvent;

/// Cleartext payload of a decrypted event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClearEvent {
    /// The real event type hidden behind `m.room.encrypted`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// The decrypted content.
    pub content: Value,
}

/// Why an event could not be decrypted.
///
/// Cloneable so the outcome of one shared attempt can be handed to every
/// waiter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecryptionError {
    /// No decryptor was available for an encrypted event.
    #[error("no decryptor available for {event_id}")]
    NoDecryptor {
        /// The encrypted event.
        event_id: String,
    },

    /// The room key needed for this event is not known.
    #[error("missing room key for session {session_id}")]
    MissingRoomKey {
        /// Megolm session the event was encrypted with.
        session_id: String,
    },

    /// The decryptor rejected the ciphertext.
    #[error("decryption failed ({code}): {message}")]
    Failed {
        /// Machine-readable reason.
        code: String,
        /// Human-readable detail.
        message: String,
    },

    /// The event was dropped while its decryption was in flight.
    #[error("event dropped before decryption finished")]
    EventDropped,
}

/// Decrypts ciphertext events.
#[async_trait]
pub trait Decryptor: Send + Sync {
    /// Decrypt one event.
    async fn decrypt(&self, event: &MatrixEvent) -> Result<ClearEvent, DecryptionError>;
}
