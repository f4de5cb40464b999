//! Relation buckets.
//!
//! A [`RelationBucket`] holds every known relation event of one
//! `(relation type, event type)` pair that targets a single origin event, and
//! keeps the aggregate for that pair up to date:
//!
//! - `m.annotation`: reactions grouped by key and by sender
//! - `m.replace`: the current edit, published onto the origin event
//! - anything else: membership only
//!
//! Members are kept in insertion order, which is delivery order and not
//! necessarily timeline order.

mod annotations;
mod replace;

pub use annotations::AnnotationGroup;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use lattice_core::{
    DecryptionError, Decryptor, EventId, RelationType, SendStatus, SharedEvent, UserId,
};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::notifications::RelationsNotification;
use annotations::AnnotationAggregate;
pub(crate) use replace::select_replacement;

#[derive(Debug)]
enum Aggregate {
    Annotation(AnnotationAggregate),
    Replace,
    Membership,
}

/// All relation events of one kind and event type targeting one origin.
pub struct RelationBucket {
    relation_type: RelationType,
    event_type: String,
    origin_id: EventId,
    origin: Option<SharedEvent>,
    members: Vec<SharedEvent>,
    seen: HashSet<EventId>,
    watched: HashSet<EventId>,
    aggregate: Aggregate,
    creation_emitted: bool,
    decryptor: Option<Arc<dyn Decryptor>>,
    tx: broadcast::Sender<RelationsNotification>,
}

impl RelationBucket {
    /// Create an empty bucket.
    ///
    /// `capacity` bounds the notification channel and is raised to one if zero.
    pub fn new(
        origin_id: EventId,
        relation_type: RelationType,
        event_type: impl Into<String>,
        capacity: usize,
    ) -> Self {
        let aggregate = match relation_type {
            RelationType::Annotation => Aggregate::Annotation(AnnotationAggregate::default()),
            RelationType::Replace => Aggregate::Replace,
            _ => Aggregate::Membership,
        };
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            relation_type,
            event_type: event_type.into(),
            origin_id,
            origin: None,
            members: Vec::new(),
            seen: HashSet::new(),
            watched: HashSet::new(),
            aggregate,
            creation_emitted: false,
            decryptor: None,
            tx,
        }
    }

    /// Decryptor used to resolve an encrypted winning edit.
    #[must_use]
    pub fn with_decryptor(mut self, decryptor: Option<Arc<dyn Decryptor>>) -> Self {
        self.set_decryptor(decryptor);
        self
    }

    /// Replace the decryptor.
    pub fn set_decryptor(&mut self, decryptor: Option<Arc<dyn Decryptor>>) {
        self.decryptor = decryptor;
    }

    /// Relation kind of this bucket.
    #[must_use]
    pub fn relation_type(&self) -> &RelationType {
        &self.relation_type
    }

    /// Event type of the members.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// ID of the origin event.
    #[must_use]
    pub fn origin_id(&self) -> &EventId {
        &self.origin_id
    }

    /// The origin event, once known.
    #[must_use]
    pub fn origin(&self) -> Option<&SharedEvent> {
        self.origin.as_ref()
    }

    /// Members in insertion order.
    #[must_use]
    pub fn members(&self) -> &[SharedEvent] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the bucket has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `event_id` is currently a member.
    #[must_use]
    pub fn contains(&self, event_id: &EventId) -> bool {
        self.members.iter().any(|e| e.event_id() == event_id)
    }

    /// Whether the bucket is still watching `event_id` for cancellation.
    #[must_use]
    pub fn is_watching(&self, event_id: &EventId) -> bool {
        self.watched.contains(event_id)
    }

    /// Receive notifications sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RelationsNotification> {
        self.tx.subscribe()
    }

    /// Reactions grouped by key, largest group first. `None` unless this is
    /// an annotation bucket.
    #[must_use]
    pub fn grouped_by_key(&self) -> Option<&[AnnotationGroup]> {
        match &self.aggregate {
            Aggregate::Annotation(agg) => Some(agg.grouped_by_key()),
            _ => None,
        }
    }

    /// Reactions grouped by sender. `None` unless this is an annotation bucket.
    #[must_use]
    pub fn grouped_by_sender(&self) -> Option<&BTreeMap<UserId, Vec<SharedEvent>>> {
        match &self.aggregate {
            Aggregate::Annotation(agg) => Some(agg.grouped_by_sender()),
            _ => None,
        }
    }

    fn emit(&self, notification: RelationsNotification) {
        let _ = self.tx.send(notification);
    }

    fn matches_identity(&self, event: &SharedEvent) -> bool {
        let Some(relation) = event.relation() else {
            error!(event_id = %event.event_id(), "event has no relation info");
            return false;
        };
        let event_type = event.event_type();
        if relation.rel_type != self.relation_type
            || relation.event_id != self.origin_id
            || event_type != self.event_type
        {
            warn!(
                event_id = %event.event_id(),
                relation_type = %relation.rel_type,
                event_type = %event_type,
                origin_id = %self.origin_id,
                "event relation info doesn't match this bucket"
            );
            return false;
        }
        true
    }

    /// Add a relation event.
    ///
    /// Events whose relation does not match the bucket are logged and
    /// dropped. Re-inserting a known event ID is a no-op, including one that
    /// was removed earlier.
    pub fn insert(&mut self, event: &SharedEvent) {
        if self.seen.contains(event.event_id()) {
            return;
        }
        if !self.matches_identity(event) {
            return;
        }

        if event.is_sending() {
            let _ = self.watched.insert(event.event_id().clone());
        }
        let _ = self.seen.insert(event.event_id().clone());
        self.members.push(SharedEvent::clone(event));

        match &mut self.aggregate {
            Aggregate::Annotation(agg) => match event.relation().and_then(|r| r.key.as_deref()) {
                Some(key) => agg.add(key, event),
                None => debug!(event_id = %event.event_id(), "annotation without key, not grouped"),
            },
            Aggregate::Replace => self.publish_replacement(),
            Aggregate::Membership => {}
        }

        debug!(
            event_id = %event.event_id(),
            origin_id = %self.origin_id,
            relation_type = %self.relation_type,
            "relation added"
        );
        self.emit(RelationsNotification::Added(SharedEvent::clone(event)));
        self.maybe_emit_created();
    }

    /// Remove a member. No-op if the event is not a member.
    pub fn remove(&mut self, event: &SharedEvent) {
        let id = event.event_id();
        let Some(pos) = self.members.iter().position(|e| e.event_id() == id) else {
            return;
        };
        let removed = self.members.remove(pos);
        let _ = self.watched.remove(id);

        match &mut self.aggregate {
            Aggregate::Annotation(agg) => {
                if let Some(key) = removed.relation().and_then(|r| r.key.as_deref()) {
                    agg.remove(key, &removed);
                }
            }
            Aggregate::Replace => self.publish_replacement(),
            Aggregate::Membership => {}
        }

        debug!(event_id = %id, origin_id = %self.origin_id, "relation removed");
        self.emit(RelationsNotification::Removed(removed));
    }

    /// Swap a local echo for the server's copy of the same event.
    ///
    /// The remote event takes the echo's place in insertion order and in the
    /// groups, so the aggregate does not count the send twice. A remote copy
    /// that no longer fits the bucket just removes the echo. Returns whether
    /// the echo was a member.
    pub fn replace_local_echo(&mut self, echo: &SharedEvent, remote: &SharedEvent) -> bool {
        let Some(pos) = self.members.iter().position(|e| e.event_id() == echo.event_id()) else {
            return false;
        };
        let _ = self.watched.remove(echo.event_id());
        if self.seen.contains(remote.event_id()) || !self.matches_identity(remote) {
            self.remove(echo);
            return true;
        }

        let _ = self.seen.insert(remote.event_id().clone());
        self.members[pos] = SharedEvent::clone(remote);
        match &mut self.aggregate {
            Aggregate::Annotation(agg) => {
                if let Some(key) = echo.relation().and_then(|r| r.key.as_deref()) {
                    agg.replace(key, echo, remote);
                }
            }
            Aggregate::Replace => self.publish_replacement(),
            Aggregate::Membership => {}
        }

        debug!(
            local_id = %echo.event_id(),
            event_id = %remote.event_id(),
            origin_id = %self.origin_id,
            "local echo replaced by remote event"
        );
        self.emit(RelationsNotification::LocalEchoReplaced {
            local_id: echo.event_id().clone(),
            event: SharedEvent::clone(remote),
        });
        true
    }

    /// React to a send-status change of a member.
    ///
    /// A confirmed send ends the watch; a cancelled one also removes the event.
    pub fn on_status_change(&mut self, event: &SharedEvent) {
        if !self.watched.contains(event.event_id()) {
            return;
        }
        match event.status() {
            SendStatus::Sent => {
                let _ = self.watched.remove(event.event_id());
            }
            SendStatus::Cancelled => self.remove(event),
            SendStatus::NotSent | SendStatus::Sending => {}
        }
    }

    /// Attach the origin event. Only the first call has an effect.
    pub fn set_origin(&mut self, origin: &SharedEvent) {
        if self.origin.is_some() {
            return;
        }
        if origin.event_id() != &self.origin_id {
            warn!(
                origin_id = %self.origin_id,
                event_id = %origin.event_id(),
                "origin event doesn't match this bucket"
            );
            return;
        }
        self.origin = Some(SharedEvent::clone(origin));

        if matches!(self.aggregate, Aggregate::Replace) {
            if let Some(replacement) = select_replacement(origin, &self.members) {
                if origin.make_replaced(Some(SharedEvent::clone(&replacement))) {
                    self.emit(RelationsNotification::Replaced {
                        origin: SharedEvent::clone(origin),
                        replacement: Some(replacement),
                    });
                }
            }
        }
        self.maybe_emit_created();
    }

    fn publish_replacement(&self) {
        let Some(origin) = &self.origin else {
            return;
        };
        let replacement = select_replacement(origin, &self.members);
        if origin.make_replaced(replacement.clone()) {
            debug!(
                origin_id = %self.origin_id,
                replacement = ?replacement.as_ref().map(|e| e.event_id().as_str()),
                "replacement changed"
            );
            self.emit(RelationsNotification::Replaced {
                origin: SharedEvent::clone(origin),
                replacement,
            });
        }
    }

    fn maybe_emit_created(&mut self) {
        if self.creation_emitted || self.members.is_empty() {
            return;
        }
        let Some(origin) = &self.origin else {
            return;
        };
        self.creation_emitted = true;
        self.emit(RelationsNotification::Created {
            origin: SharedEvent::clone(origin),
            relation_type: self.relation_type.clone(),
            event_type: self.event_type.clone(),
        });
    }

    /// The edit currently in effect, decrypted if necessary.
    ///
    /// `Ok(None)` for non-replace buckets, before the origin is known, or when
    /// no member qualifies. Decryption failures of the winner are returned.
    pub async fn current_replacement(&self) -> Result<Option<SharedEvent>, DecryptionError> {
        if !matches!(self.aggregate, Aggregate::Replace) {
            return Ok(None);
        }
        let Some(origin) = &self.origin else {
            return Ok(None);
        };
        let Some(winner) = select_replacement(origin, &self.members) else {
            return Ok(None);
        };
        if winner.is_encrypted() {
            winner.attempt_decryption(self.decryptor.as_ref()).await?;
        }
        Ok(Some(winner))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
