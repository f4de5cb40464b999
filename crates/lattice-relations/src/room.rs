//! Single-room event store.
//!
//! [`RoomTimeline`] owns every [`SharedEvent`] of one room by ID together with
//! the room's [`RelationIndex`] and [`Thread`]s, and is the one place where
//! ingestion, redaction and send-status changes are fanned out to them.
//!
//! When sync delivers the server's copy of one of the user's own local echoes
//! (matched through `unsigned.transaction_id`), the copy takes the echo's
//! place everywhere instead of being aggregated a second time. The echo's
//! provisional ID keeps resolving to the confirmed event.

use std::collections::HashMap;
use std::sync::Arc;

use lattice_core::{
    Decryptor, EventId, RelationType, RoomId, SendStatus, SharedEvent, Transport, UserId,
};
use lattice_settings::ClientSettings;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::bucket::RelationBucket;
use crate::errors::{RelationsError, Result};
use crate::index::RelationIndex;
use crate::notifications::{ThreadNotification, ThreadNotificationKind};
use crate::thread::{Thread, ThreadContext};

/// Events, relations and threads of one room.
pub struct RoomTimeline {
    room_id: RoomId,
    user_id: UserId,
    settings: ClientSettings,
    transport: Option<Arc<dyn Transport>>,
    decryptor: Option<Arc<dyn Decryptor>>,
    events: HashMap<EventId, SharedEvent>,
    confirmed_echoes: HashMap<EventId, EventId>,
    index: RelationIndex,
    threads: HashMap<EventId, Thread>,
    tx: broadcast::Sender<ThreadNotification>,
}

impl RoomTimeline {
    /// Create an empty timeline for `room_id` as seen by `user_id`.
    pub fn new(room_id: RoomId, user_id: UserId, settings: &ClientSettings) -> Self {
        let capacity = settings.relations.notification_capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            room_id,
            user_id,
            settings: settings.clone(),
            transport: None,
            decryptor: None,
            events: HashMap::new(),
            confirmed_echoes: HashMap::new(),
            index: RelationIndex::new(capacity),
            threads: HashMap::new(),
            tx,
        }
    }

    /// Create a timeline using the process-wide settings.
    pub fn with_global_settings(room_id: RoomId, user_id: UserId) -> Self {
        Self::new(room_id, user_id, lattice_settings::get_settings())
    }

    /// Attach a transport for thread fetches and edit lookups.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attach a decryptor for encrypted events.
    #[must_use]
    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.index.set_decryptor(Some(Arc::clone(&decryptor)));
        self.decryptor = Some(decryptor);
        self
    }

    /// Room ID.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Receive thread creation notifications for this room.
    pub fn subscribe_threads(&self) -> broadcast::Receiver<ThreadNotification> {
        self.tx.subscribe()
    }

    fn thread_context(&self) -> ThreadContext {
        let mut ctx =
            ThreadContext::from_settings(self.room_id.clone(), self.user_id.clone(), &self.settings);
        ctx.transport = self.transport.clone();
        ctx.decryptor = self.decryptor.clone();
        ctx
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Look up an event by ID. The provisional ID of a confirmed local echo
    /// resolves to the server's copy.
    #[must_use]
    pub fn find_event(&self, event_id: &EventId) -> Option<&SharedEvent> {
        self.events.get(event_id).or_else(|| {
            self.confirmed_echoes
                .get(event_id)
                .and_then(|id| self.events.get(id))
        })
    }

    fn resolve(&self, event_id: &EventId) -> Result<SharedEvent> {
        self.find_event(event_id)
            .cloned()
            .ok_or_else(|| RelationsError::UnknownEvent(event_id.clone()))
    }

    /// Number of events held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Relations of one kind and event type targeting `origin_id`.
    #[must_use]
    pub fn relations(
        &self,
        origin_id: &EventId,
        relation_type: &RelationType,
        event_type: &str,
    ) -> Option<&RelationBucket> {
        self.index.relations(origin_id, relation_type, event_type)
    }

    /// The relation index.
    #[must_use]
    pub fn index(&self) -> &RelationIndex {
        &self.index
    }

    /// A thread by root ID.
    #[must_use]
    pub fn thread(&self, thread_id: &EventId) -> Option<&Thread> {
        self.threads.get(thread_id)
    }

    /// A thread by root ID, mutably (for fetches).
    pub fn thread_mut(&mut self, thread_id: &EventId) -> Option<&mut Thread> {
        self.threads.get_mut(thread_id)
    }

    /// All threads, in no particular order.
    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Add an event delivered by sync, pagination or a local send.
    ///
    /// Encrypted events are decrypted first so they are routed under their
    /// clear type; a failure is logged and the event is routed as ciphertext.
    pub async fn ingest(&mut self, event: SharedEvent) {
        let id = event.event_id().clone();
        if self.events.contains_key(&id) {
            debug!(event_id = %id, "event already known");
            return;
        }

        if event.should_attempt_decryption() {
            if let Err(e) = event.attempt_decryption(self.decryptor.as_ref()).await {
                warn!(event_id = %id, error = %e, "could not decrypt event");
            }
        }

        if self.handle_remote_echo(&event).await {
            return;
        }

        let _ = self.events.insert(id.clone(), SharedEvent::clone(&event));
        self.index.attach_origin(&event);
        if let Some(relation) = event.relation() {
            let origin = self.events.get(&relation.event_id).cloned();
            let _ = self.index.route(&event, origin.as_ref());
        }

        self.route_to_thread(event).await;
    }

    /// Let the server's copy of a held local echo take the echo's place.
    ///
    /// Returns `false` when `remote` does not confirm a held echo. A
    /// cancelled echo is no longer held, so its remote copy is ingested as a
    /// new event.
    async fn handle_remote_echo(&mut self, remote: &SharedEvent) -> bool {
        let Some(local_id) = remote.transaction_id().map(EventId::from) else {
            return false;
        };
        if &local_id == remote.event_id() {
            return false;
        }
        let Some(echo) = self.events.get(&local_id).cloned() else {
            return false;
        };
        if let Err(e) = echo.set_status(SendStatus::Sent) {
            debug!(local_id = %local_id, error = %e, "echo already settled");
        }

        let remote_id = remote.event_id().clone();
        let _ = self.events.remove(&local_id);
        let _ = self.events.insert(remote_id.clone(), SharedEvent::clone(remote));
        let _ = self.confirmed_echoes.insert(local_id.clone(), remote_id.clone());
        debug!(local_id = %local_id, event_id = %remote_id, "local echo confirmed by sync");

        self.index.attach_origin(remote);
        if !self.index.replace_local_echo(&echo, remote) {
            if let Some(relation) = remote.relation() {
                let origin = self.events.get(&relation.event_id).cloned();
                let _ = self.index.route(remote, origin.as_ref());
            }
        }

        let in_thread = echo
            .thread_root_id()
            .and_then(|thread_id| self.threads.get_mut(&thread_id))
            .is_some_and(|thread| thread.replace_local_echo(&echo, remote));
        if !in_thread {
            self.route_to_thread(SharedEvent::clone(remote)).await;
        }
        true
    }

    async fn route_to_thread(&mut self, event: SharedEvent) {
        let id = event.event_id().clone();

        if let Some(thread) = self.threads.get_mut(&id) {
            if thread.root().is_none() {
                thread.set_root_event(SharedEvent::clone(&event)).await;
            }
        }

        let Some(thread_id) = event.thread_root_id() else {
            return;
        };

        if !self.threads.contains_key(&thread_id) {
            let root = self.events.get(&thread_id).cloned();
            let thread = Thread::new(thread_id.clone(), root, self.thread_context()).await;
            let _ = self.threads.insert(thread_id.clone(), thread);
            debug!(thread_id = %thread_id, "thread created");
            let _ = self.tx.send(ThreadNotification {
                thread_id: thread_id.clone(),
                kind: ThreadNotificationKind::New,
            });
        }

        if thread_id == id {
            return;
        }
        if let Some(thread) = self.threads.get_mut(&thread_id) {
            thread.add_event(event, false).await;
        }
    }

    // ── Redaction and status ─────────────────────────────────────────────

    /// Apply a redaction of `event_id`.
    ///
    /// Aggregates only change once the redaction is confirmed by the server;
    /// an unconfirmed (local) redaction is a no-op here.
    pub fn redact(&mut self, event_id: &EventId, confirmed: bool) -> Result<()> {
        let event = self.resolve(event_id)?;
        if !confirmed {
            debug!(event_id = %event_id, "redaction pending, aggregates unchanged");
            return Ok(());
        }
        if event.is_redacted() {
            return Ok(());
        }

        let thread_id = event.thread_root_id();
        if let Some(thread_id) = &thread_id {
            if let Some(thread) = self.threads.get_mut(thread_id) {
                thread.before_redaction(&event);
            }
        }
        self.index.route_removal(&event);
        event.mark_redacted();
        if let Some(thread_id) = &thread_id {
            if let Some(thread) = self.threads.get_mut(thread_id) {
                thread.after_redaction(&event);
            }
        }
        Ok(())
    }

    /// Change the send status of a held event and propagate it.
    ///
    /// A cancelled event is removed from every bucket and thread and dropped
    /// from the timeline. For an echo already confirmed by sync, `Sent` is a
    /// no-op and `Cancelled` is rejected.
    pub fn update_status(&mut self, event_id: &EventId, status: SendStatus) -> Result<()> {
        let event = self.resolve(event_id)?;
        let previous = event.set_status(status)?;
        if previous == status {
            return Ok(());
        }

        self.index.route_status_change(&event);
        if let Some(thread_id) = event.thread_root_id() {
            if let Some(thread) = self.threads.get_mut(&thread_id) {
                if status == SendStatus::Cancelled {
                    thread.remove_event(event.event_id());
                } else {
                    thread.handle_echo_update(&event);
                }
            }
        }

        if status == SendStatus::Cancelled {
            let _ = self.events.remove(event.event_id());
        }
        Ok(())
    }
}
