//! Thread aggregation.
//!
//! A [`Thread`] follows one thread root and maintains its reply timeline,
//! reply count, last-reply pointer and participation flag. It runs in one of
//! two modes chosen by [`ThreadContext::server_side_support`]:
//!
//! - **server mode**: the root's bundled summary is authoritative. Counters
//!   are seeded from it, and only live replies newer than the last reply are
//!   appended once the initial fetch has happened.
//! - **fallback mode**: every routed event is added and thread replies are
//!   counted locally. The count can drift under partial visibility.

use std::collections::HashSet;
use std::sync::Arc;

use lattice_core::{
    Decryptor, Direction, EventId, MatrixEvent, RelationType, RelationsChunk,
    RelationsRequestOpts, RoomId, SharedEvent, Transport, TransportError, UserId, fetch_relations,
    relation::thread_relation_name,
};
use lattice_settings::ClientSettings;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::notifications::{ThreadNotification, ThreadNotificationKind};

/// Lifecycle of a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Neither root nor replies known.
    Uninitialized,
    /// Root or replies known, initial fetch not attempted.
    Partial,
    /// Initial fetch attempted, successful or not.
    Initialized,
}

/// Everything a thread needs from its room and client.
#[derive(Clone)]
pub struct ThreadContext {
    /// Room the thread lives in.
    pub room_id: RoomId,
    /// The requesting user, for the participation flag.
    pub user_id: UserId,
    /// Whether the homeserver bundles thread summaries.
    pub server_side_support: bool,
    /// Request `m.thread` rather than `io.element.thread`.
    pub prefer_stable_prefix: bool,
    /// Page size for edit lookups of encrypted replies.
    pub edit_fetch_limit: u32,
    /// Notification channel capacity.
    pub notification_capacity: usize,
    /// Used for initial fetch and edit lookups.
    pub transport: Option<Arc<dyn Transport>>,
    /// Used for best-effort decryption of added events.
    pub decryptor: Option<Arc<dyn Decryptor>>,
}

impl ThreadContext {
    /// Build a context from client settings, without collaborators.
    pub fn from_settings(room_id: RoomId, user_id: UserId, settings: &ClientSettings) -> Self {
        Self {
            room_id,
            user_id,
            server_side_support: settings.threads.server_side_support,
            prefer_stable_prefix: settings.threads.prefer_stable_prefix,
            edit_fetch_limit: settings.relations.edit_fetch_limit,
            notification_capacity: settings.relations.notification_capacity,
            transport: None,
            decryptor: None,
        }
    }

    /// Attach a transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attach a decryptor.
    #[must_use]
    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }
}

/// Result of [`Thread::fetch_initial_events`].
#[derive(Clone, Debug)]
pub struct ThreadFetchResult {
    /// The thread root, if known.
    pub root: Option<SharedEvent>,
    /// Fetched replies, oldest first.
    pub events: Vec<SharedEvent>,
    /// Pagination token towards older replies.
    pub next_batch: Option<String>,
    /// Pagination token towards newer replies.
    pub prev_batch: Option<String>,
}

/// One thread of a room.
pub struct Thread {
    id: EventId,
    root: Option<SharedEvent>,
    timeline: Vec<SharedEvent>,
    last_event: Option<SharedEvent>,
    reply_count: usize,
    counted: HashSet<EventId>,
    participated: bool,
    initial_events_fetched: bool,
    seeded: bool,
    ctx: ThreadContext,
    tx: broadcast::Sender<ThreadNotification>,
}

impl Thread {
    /// Create a thread with an explicit ID.
    ///
    /// In server mode a root carrying a bundled summary seeds the counters.
    pub async fn new(id: EventId, root: Option<SharedEvent>, ctx: ThreadContext) -> Self {
        let (tx, _) = broadcast::channel(ctx.notification_capacity.max(1));
        let mut thread = Self {
            id,
            root: None,
            timeline: Vec::new(),
            last_event: None,
            reply_count: 0,
            counted: HashSet::new(),
            participated: false,
            initial_events_fetched: false,
            seeded: false,
            ctx,
            tx,
        };
        if let Some(root) = root {
            thread.set_root_event(root).await;
        }
        thread
    }

    /// Create a thread from a root and initial events.
    ///
    /// The ID is the root's, or the relation target of the first thread reply
    /// when the root is unknown. Returns `None` if neither gives an ID.
    pub async fn from_events(
        root: Option<SharedEvent>,
        initial_events: Vec<SharedEvent>,
        ctx: ThreadContext,
    ) -> Option<Self> {
        let id = root.as_ref().map(|r| r.event_id().clone()).or_else(|| {
            initial_events
                .iter()
                .find(|e| e.is_thread_relation())
                .and_then(|e| e.relation())
                .map(|r| r.event_id.clone())
        })?;
        let mut thread = Self::new(id, root, ctx).await;
        for event in initial_events {
            thread.add_event(event, false).await;
        }
        Some(thread)
    }

    // ── Accessors ────────────────────────────────────────────────────────

    /// Root event ID.
    #[must_use]
    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// Room ID.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.ctx.room_id
    }

    /// Root event, if known.
    #[must_use]
    pub fn root(&self) -> Option<&SharedEvent> {
        self.root.as_ref()
    }

    /// Number of replies.
    #[must_use]
    pub fn reply_count(&self) -> usize {
        self.reply_count
    }

    /// Alias of [`Self::reply_count`].
    #[must_use]
    pub fn length(&self) -> usize {
        self.reply_count
    }

    /// Whether the requesting user has sent an event in the thread.
    #[must_use]
    pub fn has_participated(&self) -> bool {
        self.participated
    }

    /// Whether the initial fetch has been attempted.
    #[must_use]
    pub fn initial_events_fetched(&self) -> bool {
        self.initial_events_fetched
    }

    /// Whether the thread runs in server mode.
    #[must_use]
    pub fn server_side_support(&self) -> bool {
        self.ctx.server_side_support
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> ThreadState {
        if self.initial_events_fetched {
            ThreadState::Initialized
        } else if self.root.is_some() || !self.timeline.is_empty() || self.last_event.is_some() {
            ThreadState::Partial
        } else {
            ThreadState::Uninitialized
        }
    }

    /// Timeline events, oldest first.
    #[must_use]
    pub fn events(&self) -> &[SharedEvent] {
        &self.timeline
    }

    /// The cached last-reply pointer.
    #[must_use]
    pub fn reply_to_event(&self) -> Option<&SharedEvent> {
        self.last_event.as_ref()
    }

    /// Whether the timeline holds `event_id`.
    #[must_use]
    pub fn has(&self, event_id: &EventId) -> bool {
        self.timeline.iter().any(|e| e.event_id() == event_id)
    }

    /// Find an event of the thread, including a pointer seeded from the
    /// bundled summary that is not in the timeline.
    #[must_use]
    pub fn find_event_by_id(&self, event_id: &EventId) -> Option<&SharedEvent> {
        if let Some(last) = &self.last_event {
            if last.event_id() == event_id {
                return Some(last);
            }
        }
        self.timeline.iter().find(|e| e.event_id() == event_id)
    }

    /// Newest non-redacted timeline event matching `predicate`.
    pub fn last_reply(&self, predicate: impl Fn(&MatrixEvent) -> bool) -> Option<&SharedEvent> {
        self.timeline
            .iter()
            .rev()
            .find(|e| !e.is_redacted() && predicate(e))
    }

    /// Receive notifications sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ThreadNotification> {
        self.tx.subscribe()
    }

    fn emit(&self, kind: ThreadNotificationKind) {
        let _ = self.tx.send(ThreadNotification {
            thread_id: self.id.clone(),
            kind,
        });
    }

    // ── Root and seeding ─────────────────────────────────────────────────

    /// Attach the root once it is known.
    ///
    /// A root that arrives after replies still seeds the counters from its
    /// bundled summary in server mode, provided no seed happened yet.
    pub async fn set_root_event(&mut self, root: SharedEvent) {
        if self.root.is_some() {
            return;
        }
        if root.event_id() != &self.id {
            warn!(thread_id = %self.id, event_id = %root.event_id(), "root doesn't match thread");
            return;
        }
        root.set_thread_id(self.id.clone());
        self.root = Some(SharedEvent::clone(&root));
        if !self.seeded {
            self.seed_from_bundle(&root).await;
        }
    }

    async fn seed_from_bundle(&mut self, root: &SharedEvent) {
        if !self.ctx.server_side_support {
            return;
        }
        let Some(summary) = root.bundled().thread.as_ref() else {
            return;
        };
        self.seeded = true;
        self.reply_count = summary.count;
        self.participated = summary.current_user_participated;

        match MatrixEvent::from_json(&self.ctx.room_id, summary.latest_event.clone()) {
            Ok(latest) => {
                latest.set_thread_id(self.id.clone());
                self.fetch_edits_where_needed(&latest).await;
                self.last_event = Some(latest);
            }
            Err(e) => {
                warn!(thread_id = %self.id, error = %e, "ignoring malformed bundled latest event");
            }
        }
        debug!(thread_id = %self.id, count = self.reply_count, "thread seeded from bundle");
    }

    async fn fetch_edits_where_needed(&self, event: &SharedEvent) {
        if !event.is_encrypted() {
            return;
        }
        let Some(transport) = &self.ctx.transport else {
            return;
        };
        let opts = RelationsRequestOpts {
            limit: Some(self.ctx.edit_fetch_limit),
            ..RelationsRequestOpts::default()
        };
        let result = fetch_relations(
            transport.as_ref(),
            &self.ctx.room_id,
            event.event_id(),
            RelationType::Replace.as_str(),
            Some(&event.event_type()),
            &opts,
        )
        .await;

        match result {
            Ok(chunk) => {
                let Some(raw) = chunk.chunk.into_iter().next() else {
                    return;
                };
                match MatrixEvent::from_json(&self.ctx.room_id, raw) {
                    Ok(edit) => {
                        let _ = event.make_replaced(Some(edit));
                    }
                    Err(e) => warn!(event_id = %event.event_id(), error = %e, "ignoring malformed edit"),
                }
            }
            Err(e) => {
                error!(event_id = %event.event_id(), error = %e, "failed to load edits for encrypted thread event");
            }
        }
    }

    // ── Membership ───────────────────────────────────────────────────────

    fn insert_into_timeline(&mut self, event: &SharedEvent, to_start: bool) -> bool {
        if self.has(event.event_id()) {
            return false;
        }
        if to_start {
            self.timeline.insert(0, SharedEvent::clone(event));
        } else {
            self.timeline.push(SharedEvent::clone(event));
        }
        true
    }

    fn is_newer_than_last_reply(&self, event: &MatrixEvent) -> bool {
        self.last_reply(|_| true)
            .is_none_or(|last| event.local_timestamp() > last.local_timestamp())
    }

    /// Add an event to the thread.
    ///
    /// Never fails: decryption and edit-lookup errors are logged.
    pub async fn add_event(&mut self, event: SharedEvent, to_start: bool) {
        let added = if self.ctx.server_side_support {
            if !to_start && self.initial_events_fetched && self.is_newer_than_last_reply(&event) {
                self.fetch_edits_where_needed(&event).await;
                event.set_thread_id(self.id.clone());
                self.insert_into_timeline(&event, false)
            } else {
                false
            }
        } else {
            event.set_thread_id(self.id.clone());
            let added = self.insert_into_timeline(&event, to_start);
            if event.should_attempt_decryption() {
                if let Err(e) = event.attempt_decryption(self.ctx.decryptor.as_ref()).await {
                    debug!(event_id = %event.event_id(), error = %e, "thread event left encrypted");
                }
            }
            added
        };

        if !self.participated && event.sender() == &self.ctx.user_id {
            self.participated = true;
        }

        if added {
            if !self.ctx.server_side_support && event.is_thread_relation() {
                self.count_reply(event.event_id());
            }
            let _ = self.advance_last_reply(&event, self.ctx.server_side_support);
        }

        self.emit(ThreadNotificationKind::Update);
    }

    /// Apply the last-reply rule. In server mode an advance to a reply also
    /// counts it. Returns whether the pointer moved.
    fn advance_last_reply(&mut self, event: &SharedEvent, count: bool) -> bool {
        let replace = match &self.last_event {
            None => true,
            Some(last) if Arc::ptr_eq(last, event) => false,
            Some(last) => {
                last.is_redacted()
                    || (event.is_thread_relation()
                        && last.event_id() != event.event_id()
                        && event.local_timestamp() > last.local_timestamp())
            }
        };
        if !replace {
            return false;
        }

        self.last_event = Some(SharedEvent::clone(event));
        if event.event_id() != &self.id {
            if count {
                self.count_reply(event.event_id());
            }
            self.emit(ThreadNotificationKind::NewReply(SharedEvent::clone(event)));
        }
        true
    }

    /// Count a reply the server summary does not already include. Counting
    /// the same ID twice is a no-op.
    fn count_reply(&mut self, event_id: &EventId) {
        if self.counted.insert(event_id.clone()) {
            self.reply_count += 1;
        }
    }

    /// A member's send status changed without cancelling it.
    pub fn handle_echo_update(&mut self, event: &SharedEvent) {
        if !self.has(event.event_id()) {
            return;
        }
        let _ = self.advance_last_reply(event, self.ctx.server_side_support);
        self.emit(ThreadNotificationKind::Update);
    }

    /// Drop a cancelled member.
    pub fn remove_event(&mut self, event_id: &EventId) {
        let Some(pos) = self.timeline.iter().position(|e| e.event_id() == event_id) else {
            return;
        };
        let removed = self.timeline.remove(pos);
        let was_pointer = self
            .last_event
            .as_ref()
            .is_some_and(|l| l.event_id() == event_id);

        if self.counted.remove(removed.event_id()) {
            self.reply_count = self.reply_count.saturating_sub(1);
        }
        if was_pointer {
            self.rescan_last_reply();
        }
        self.emit(ThreadNotificationKind::Update);
    }

    /// Swap a local echo for the server's copy of the same event.
    ///
    /// The remote event takes the echo's timeline slot, its place in the
    /// reply count and, if the echo was the last reply, the pointer. Returns
    /// whether the echo was part of the thread.
    pub fn replace_local_echo(&mut self, echo: &SharedEvent, remote: &SharedEvent) -> bool {
        let Some(pos) = self.timeline.iter().position(|e| e.event_id() == echo.event_id()) else {
            return false;
        };
        if self.has(remote.event_id()) {
            self.remove_event(echo.event_id());
            return true;
        }

        remote.set_thread_id(self.id.clone());
        self.timeline[pos] = SharedEvent::clone(remote);
        if self.counted.remove(echo.event_id()) {
            let _ = self.counted.insert(remote.event_id().clone());
        }
        let was_pointer = self
            .last_event
            .as_ref()
            .is_some_and(|l| l.event_id() == echo.event_id());
        if was_pointer {
            self.last_event = Some(SharedEvent::clone(remote));
        }
        debug!(thread_id = %self.id, local_id = %echo.event_id(), event_id = %remote.event_id(), "local echo replaced");
        self.emit(ThreadNotificationKind::Update);
        true
    }

    // ── Redaction ────────────────────────────────────────────────────────

    /// Called before a confirmed redaction is applied to `event`.
    pub fn before_redaction(&mut self, event: &SharedEvent) {
        if event.is_thread_relation() && event.thread_root_id().as_ref() == Some(&self.id) {
            let _ = self.counted.remove(event.event_id());
            self.reply_count = self.reply_count.saturating_sub(1);
            self.emit(ThreadNotificationKind::Update);
        }
    }

    /// Called after `event` has been marked redacted.
    pub fn after_redaction(&mut self, event: &SharedEvent) {
        if event.thread_root_id().as_ref() != Some(&self.id) {
            return;
        }
        let was_pointer = self
            .last_event
            .as_ref()
            .is_some_and(|l| l.event_id() == event.event_id());
        if was_pointer {
            self.rescan_last_reply();
        }
        self.emit(ThreadNotificationKind::Update);
    }

    fn rescan_last_reply(&mut self) {
        self.last_event = self
            .timeline
            .iter()
            .rev()
            .find(|e| !e.is_redacted() && e.is_thread_relation())
            .cloned()
            .or_else(|| self.root.clone());
    }

    // ── Initial fetch ────────────────────────────────────────────────────

    /// Fetch the thread's replies from the server.
    ///
    /// Fallback mode has nothing to fetch and returns `None`. Transport
    /// failures are logged and also yield `None`. Either way the thread is
    /// [`ThreadState::Initialized`] afterwards.
    pub async fn fetch_initial_events(&mut self) -> Option<ThreadFetchResult> {
        if !self.ctx.server_side_support {
            self.initial_events_fetched = true;
            return None;
        }

        let result = self.fetch_events().await;
        self.initial_events_fetched = true;
        match result {
            Ok(result) => Some(result),
            Err(e) => {
                error!(thread_id = %self.id, error = %e, "failed to fetch thread events");
                None
            }
        }
    }

    async fn fetch_events(&mut self) -> Result<ThreadFetchResult, TransportError> {
        let Some(transport) = self.ctx.transport.clone() else {
            return Err(TransportError::Connection {
                message: "no transport configured".into(),
            });
        };
        let chunk: RelationsChunk = fetch_relations(
            transport.as_ref(),
            &self.ctx.room_id,
            &self.id,
            thread_relation_name(self.ctx.prefer_stable_prefix),
            None,
            &RelationsRequestOpts {
                dir: Some(Direction::Backward),
                ..RelationsRequestOpts::default()
            },
        )
        .await?;

        let mut events = Vec::with_capacity(chunk.chunk.len());
        for raw in chunk.chunk.into_iter().rev() {
            match MatrixEvent::from_json(&self.ctx.room_id, raw) {
                Ok(event) => events.push(event),
                Err(e) => warn!(thread_id = %self.id, error = %e, "skipping malformed thread event"),
            }
        }

        for event in &events {
            event.set_thread_id(self.id.clone());
            self.fetch_edits_where_needed(event).await;
            if self.insert_into_timeline(event, false) {
                let _ = self.advance_last_reply(event, false);
            }
        }
        self.emit(ThreadNotificationKind::Update);

        Ok(ThreadFetchResult {
            root: self.root.clone(),
            events,
            next_batch: chunk.next_batch,
            prev_batch: chunk.prev_batch,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
