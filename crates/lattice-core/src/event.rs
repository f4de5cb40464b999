//! The shared event entity.
//!
//! A [`MatrixEvent`] wraps one decoded protocol event. The wire fields
//! (ID, type, sender, timestamps, relation descriptor) never change after
//! construction. Local annotations that other components must observe
//! (send status, redaction, decryption result, thread linkage, current
//! replacement) live behind a lock so every holder of the [`SharedEvent`]
//! handle sees the same state.
//!
//! Buckets and threads store `SharedEvent` handles, never copies.

use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::constants::{NEW_CONTENT, ROOM_ENCRYPTED};
use crate::decryption::{ClearEvent, DecryptionError, Decryptor};
use crate::errors::{EventError, Result};
use crate::ids::{EventId, RoomId, UserId};
use crate::relation::{BundledAggregations, Relation, RelationType};

/// Reference-counted handle to an event. Cloning shares the entity.
pub type SharedEvent = Arc<MatrixEvent>;

type SharedDecryption = Shared<BoxFuture<'static, std::result::Result<ClearEvent, DecryptionError>>>;

/// Delivery state of an event.
///
/// `Sent` and `Cancelled` are terminal. `NotSent` and `Sending` may alternate
/// while the transport retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// Queued locally or failed; may be retried.
    NotSent,
    /// Handed to the transport, awaiting confirmation.
    Sending,
    /// Confirmed by the server (every remote event is in this state).
    Sent,
    /// Abandoned before confirmation.
    Cancelled,
}

impl SendStatus {
    /// Whether no further transition is allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Cancelled)
    }

    /// Whether the event is still a pending local echo.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::NotSent | Self::Sending)
    }

    /// Wire-style name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSent => "not_sent",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decryption state of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncryptionState {
    /// Never encrypted.
    Plaintext,
    /// Ciphertext not yet decrypted (an attempt may be in flight).
    PendingDecryption,
    /// Cleartext available.
    Decrypted,
    /// The last attempt failed; the error is kept for later waiters.
    DecryptionFailed(DecryptionError),
}

struct EventState {
    status: SendStatus,
    redacted: bool,
    encryption: EncryptionState,
    clear: Option<ClearEvent>,
    decryption: Option<SharedDecryption>,
    thread_id: Option<EventId>,
    replacement: Option<SharedEvent>,
}

/// A decoded protocol event plus its mutable local annotations.
pub struct MatrixEvent {
    event_id: EventId,
    room_id: RoomId,
    sender: UserId,
    wire_type: String,
    wire_content: Value,
    state_key: Option<String>,
    origin_server_ts: u64,
    local_timestamp: u64,
    relation: Option<Relation>,
    bundled: BundledAggregations,
    raw: Value,
    state: RwLock<EventState>,
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

fn str_field(raw: &Value, field: &'static str) -> Result<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or(EventError::MissingField { field })
}

impl MatrixEvent {
    /// Decode a wire event received in `room_id`.
    ///
    /// The local timestamp is `now - unsigned.age` when the server supplied an
    /// age, otherwise the server timestamp.
    pub fn from_json(room_id: &RoomId, raw: Value) -> Result<SharedEvent> {
        let origin_server_ts = raw
            .get("origin_server_ts")
            .and_then(Value::as_u64)
            .ok_or(EventError::MissingField { field: "origin_server_ts" })?;
        let local_timestamp = raw
            .get("unsigned")
            .and_then(|u| u.get("age"))
            .and_then(Value::as_u64)
            .map_or(origin_server_ts, |age| now_ms().saturating_sub(age));
        Self::from_json_at(room_id, raw, local_timestamp)
    }

    /// Decode a wire event with an explicit client-observed timestamp.
    pub fn from_json_at(room_id: &RoomId, raw: Value, local_timestamp: u64) -> Result<SharedEvent> {
        let event_id = EventId::from_string(str_field(&raw, "event_id")?);
        let wire_type = str_field(&raw, "type")?;
        let sender = UserId::from_string(str_field(&raw, "sender")?);
        let origin_server_ts = raw
            .get("origin_server_ts")
            .and_then(Value::as_u64)
            .ok_or(EventError::MissingField { field: "origin_server_ts" })?;
        let room_id = raw
            .get("room_id")
            .and_then(Value::as_str)
            .map_or_else(|| room_id.clone(), RoomId::from);
        let wire_content = raw
            .get("content")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let state_key = raw
            .get("state_key")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        let relation = Relation::from_content(&wire_content);
        let bundled = BundledAggregations::from_unsigned(raw.get("unsigned"));
        let encryption = if wire_type == ROOM_ENCRYPTED {
            EncryptionState::PendingDecryption
        } else {
            EncryptionState::Plaintext
        };

        Ok(Arc::new(Self {
            event_id,
            room_id,
            sender,
            wire_type,
            wire_content,
            state_key,
            origin_server_ts,
            local_timestamp,
            relation,
            bundled,
            raw,
            state: RwLock::new(EventState {
                status: SendStatus::Sent,
                redacted: false,
                encryption,
                clear: None,
                decryption: None,
                thread_id: None,
                replacement: None,
            }),
        }))
    }

    /// Create a local echo for an event the user is about to send.
    ///
    /// The echo gets a provisional ID and starts in [`SendStatus::Sending`].
    /// The provisional ID doubles as the transaction ID, so the server's copy
    /// can be matched back to the echo through `unsigned.transaction_id`.
    pub fn local_echo(
        room_id: &RoomId,
        sender: &UserId,
        event_type: &str,
        content: Value,
    ) -> SharedEvent {
        let event_id = EventId::new_local();
        let now = now_ms();
        let raw = json!({
            "event_id": event_id.as_str(),
            "room_id": room_id.as_str(),
            "sender": sender.as_str(),
            "type": event_type,
            "origin_server_ts": now,
            "content": content,
            "unsigned": {"transaction_id": event_id.as_str()},
        });
        Arc::new(Self {
            relation: Relation::from_content(&content),
            event_id,
            room_id: room_id.clone(),
            sender: sender.clone(),
            wire_type: event_type.to_owned(),
            wire_content: content,
            state_key: None,
            origin_server_ts: now,
            local_timestamp: now,
            bundled: BundledAggregations::default(),
            raw,
            state: RwLock::new(EventState {
                status: SendStatus::Sending,
                redacted: false,
                encryption: EncryptionState::Plaintext,
                clear: None,
                decryption: None,
                thread_id: None,
                replacement: None,
            }),
        })
    }

    // ── Wire fields ──────────────────────────────────────────────────────

    /// Event ID.
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Room the event belongs to.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Sender.
    #[must_use]
    pub fn sender(&self) -> &UserId {
        &self.sender
    }

    /// Effective type: the cleartext type once decrypted, else the wire type.
    #[must_use]
    pub fn event_type(&self) -> String {
        self.state
            .read()
            .clear
            .as_ref()
            .map_or_else(|| self.wire_type.clone(), |c| c.event_type.clone())
    }

    /// Type as received (`m.room.encrypted` for ciphertext).
    #[must_use]
    pub fn wire_type(&self) -> &str {
        &self.wire_type
    }

    /// Effective content: the cleartext content once decrypted, else the wire content.
    #[must_use]
    pub fn content(&self) -> Value {
        self.state
            .read()
            .clear
            .as_ref()
            .map_or_else(|| self.wire_content.clone(), |c| c.content.clone())
    }

    /// Content as received.
    #[must_use]
    pub fn wire_content(&self) -> &Value {
        &self.wire_content
    }

    /// Cleartext, if decrypted.
    #[must_use]
    pub fn clear_event(&self) -> Option<ClearEvent> {
        self.state.read().clear.clone()
    }

    /// State key, for state events.
    #[must_use]
    pub fn state_key(&self) -> Option<&str> {
        self.state_key.as_deref()
    }

    /// Server-assigned timestamp in milliseconds.
    #[must_use]
    pub fn origin_server_ts(&self) -> u64 {
        self.origin_server_ts
    }

    /// Client-observed timestamp in milliseconds.
    #[must_use]
    pub fn local_timestamp(&self) -> u64 {
        self.local_timestamp
    }

    /// The full wire JSON.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Transaction ID of a local send, from `unsigned.transaction_id`.
    ///
    /// Only set on local echoes and on the server's copy of the user's own
    /// events.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.raw
            .get("unsigned")
            .and_then(|u| u.get("transaction_id"))
            .and_then(Value::as_str)
    }

    /// Relation descriptor, if any. Immutable for the event's lifetime.
    #[must_use]
    pub fn relation(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }

    /// Whether the event declares a relation of the given kind.
    #[must_use]
    pub fn is_relation(&self, rel_type: &RelationType) -> bool {
        self.relation.as_ref().is_some_and(|r| &r.rel_type == rel_type)
    }

    /// Whether the event is a thread reply.
    #[must_use]
    pub fn is_thread_relation(&self) -> bool {
        self.is_relation(&RelationType::Thread)
    }

    /// Server bundled aggregations.
    #[must_use]
    pub fn bundled(&self) -> &BundledAggregations {
        &self.bundled
    }

    /// Server timestamp of the latest bundled replacement, if the server sent one.
    #[must_use]
    pub fn bundled_replacement_ts(&self) -> Option<u64> {
        self.bundled.replace.as_ref().and_then(|r| r.origin_server_ts)
    }

    // ── Send status ──────────────────────────────────────────────────────

    /// Current send status.
    #[must_use]
    pub fn status(&self) -> SendStatus {
        self.state.read().status
    }

    /// Whether the event is a pending local echo.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.status().is_pending()
    }

    /// Move to a new send status, returning the previous one.
    ///
    /// Setting the current status again is a no-op. Leaving a terminal status
    /// fails.
    pub fn set_status(&self, status: SendStatus) -> Result<SendStatus> {
        let mut state = self.state.write();
        let previous = state.status;
        if previous == status {
            return Ok(previous);
        }
        if previous.is_terminal() {
            return Err(EventError::InvalidStatusTransition {
                event_id: self.event_id.clone(),
                from: previous,
                to: status,
            });
        }
        state.status = status;
        debug!(event_id = %self.event_id, from = %previous, to = %status, "send status changed");
        Ok(previous)
    }

    // ── Redaction ────────────────────────────────────────────────────────

    /// Whether a confirmed redaction has been applied.
    #[must_use]
    pub fn is_redacted(&self) -> bool {
        self.state.read().redacted
    }

    /// Apply a confirmed redaction. Drops any published replacement.
    pub fn mark_redacted(&self) {
        let mut state = self.state.write();
        state.redacted = true;
        state.replacement = None;
    }

    // ── Decryption ───────────────────────────────────────────────────────

    /// Whether the wire event is ciphertext.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.wire_type == ROOM_ENCRYPTED
    }

    /// Current decryption state.
    #[must_use]
    pub fn encryption_state(&self) -> EncryptionState {
        self.state.read().encryption.clone()
    }

    /// Whether an attempt is currently in flight.
    #[must_use]
    pub fn is_being_decrypted(&self) -> bool {
        self.state.read().decryption.is_some()
    }

    /// Whether a new attempt should be started.
    #[must_use]
    pub fn should_attempt_decryption(&self) -> bool {
        let state = self.state.read();
        state.encryption == EncryptionState::PendingDecryption && state.decryption.is_none()
    }

    /// Install a cleartext produced outside [`Self::attempt_decryption`].
    pub fn set_clear_event(&self, clear: ClearEvent) {
        let mut state = self.state.write();
        state.clear = Some(clear);
        state.encryption = EncryptionState::Decrypted;
        state.decryption = None;
    }

    /// Decrypt the event, joining an attempt already in flight.
    ///
    /// Plaintext and already-decrypted events succeed immediately. A previous
    /// failure is returned again without retrying.
    pub async fn attempt_decryption(
        self: &Arc<Self>,
        decryptor: Option<&Arc<dyn Decryptor>>,
    ) -> std::result::Result<(), DecryptionError> {
        let in_flight = {
            let mut state = self.state.write();
            match &state.encryption {
                EncryptionState::Plaintext | EncryptionState::Decrypted => return Ok(()),
                EncryptionState::DecryptionFailed(err) => return Err(err.clone()),
                EncryptionState::PendingDecryption => {}
            }
            if let Some(existing) = &state.decryption {
                existing.clone()
            } else {
                let Some(decryptor) = decryptor else {
                    return Err(DecryptionError::NoDecryptor {
                        event_id: self.event_id.to_string(),
                    });
                };
                let weak: Weak<Self> = Arc::downgrade(self);
                let decryptor = Arc::clone(decryptor);
                let attempt = async move {
                    let Some(event) = weak.upgrade() else {
                        return Err(DecryptionError::EventDropped);
                    };
                    decryptor.decrypt(&event).await
                }
                .boxed()
                .shared();
                state.decryption = Some(attempt.clone());
                attempt
            }
        };

        let outcome = in_flight.await;
        let mut state = self.state.write();
        state.decryption = None;
        match outcome {
            Ok(clear) => {
                state.clear = Some(clear);
                state.encryption = EncryptionState::Decrypted;
                Ok(())
            }
            Err(err) => {
                debug!(event_id = %self.event_id, error = %err, "decryption failed");
                state.encryption = EncryptionState::DecryptionFailed(err.clone());
                Err(err)
            }
        }
    }

    // ── Thread linkage ───────────────────────────────────────────────────

    /// The thread this event belongs to.
    ///
    /// Explicit linkage wins; otherwise thread replies belong to their
    /// relation target and roots carrying a bundled thread summary to
    /// themselves.
    #[must_use]
    pub fn thread_root_id(&self) -> Option<EventId> {
        if let Some(id) = &self.state.read().thread_id {
            return Some(id.clone());
        }
        match &self.relation {
            Some(rel) if rel.rel_type.is_thread() => Some(rel.event_id.clone()),
            _ if self.bundled.thread.is_some() => Some(self.event_id.clone()),
            _ => None,
        }
    }

    /// Link the event to a thread.
    pub fn set_thread_id(&self, thread_id: EventId) {
        self.state.write().thread_id = Some(thread_id);
    }

    // ── Replacement ──────────────────────────────────────────────────────

    /// Publish the current replacement of this (origin) event.
    ///
    /// Returns `true` when the published replacement changed.
    pub fn make_replaced(&self, replacement: Option<SharedEvent>) -> bool {
        let mut state = self.state.write();
        let before = state.replacement.as_ref().map(|e| e.event_id.clone());
        let after = replacement.as_ref().map(|e| e.event_id.clone());
        state.replacement = replacement;
        before != after
    }

    /// The published replacement, if any.
    #[must_use]
    pub fn replacing_event(&self) -> Option<SharedEvent> {
        self.state.read().replacement.clone()
    }

    /// Content as displayed: the replacement's `m.new_content` when edited.
    #[must_use]
    pub fn effective_content(&self) -> Value {
        if let Some(replacement) = self.replacing_event() {
            if let Some(new_content) = replacement.content().get(NEW_CONTENT) {
                if new_content.is_object() {
                    return new_content.clone();
                }
            }
        }
        self.content()
    }
}

impl fmt::Debug for MatrixEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MatrixEvent")
            .field("event_id", &self.event_id)
            .field("type", &self.wire_type)
            .field("sender", &self.sender)
            .field("origin_server_ts", &self.origin_server_ts)
            .field("relation", &self.relation)
            .field("status", &state.status)
            .field("redacted", &state.redacted)
            .field("encryption", &state.encryption)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
