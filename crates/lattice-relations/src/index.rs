//! Relation index: origin event ID → buckets.
//!
//! Buckets are created lazily on the first relation targeting a
//! `(origin, relation type, event type)` triple and live as long as the index.

use std::collections::HashMap;
use std::sync::Arc;

use lattice_core::{Decryptor, EventId, RelationType, SendStatus, SharedEvent};
use tracing::debug;

use crate::bucket::RelationBucket;

type BucketKey = (RelationType, String);

/// Maps origin event IDs to their relation buckets.
pub struct RelationIndex {
    buckets: HashMap<EventId, HashMap<BucketKey, RelationBucket>>,
    capacity: usize,
    decryptor: Option<Arc<dyn Decryptor>>,
}

impl RelationIndex {
    /// Create an empty index whose buckets use `capacity` notification slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            capacity,
            decryptor: None,
        }
    }

    /// Decryptor handed to every bucket, existing ones included.
    #[must_use]
    pub fn with_decryptor(mut self, decryptor: Option<Arc<dyn Decryptor>>) -> Self {
        self.set_decryptor(decryptor);
        self
    }

    /// Replace the decryptor of the index and of every bucket it holds.
    pub fn set_decryptor(&mut self, decryptor: Option<Arc<dyn Decryptor>>) {
        for bucket in self.buckets.values_mut().flat_map(HashMap::values_mut) {
            bucket.set_decryptor(decryptor.clone());
        }
        self.decryptor = decryptor;
    }

    /// Notification capacity of the buckets.
    #[must_use]
    pub fn notification_capacity(&self) -> usize {
        self.capacity
    }

    /// The bucket for a triple, created if missing. Always the same instance
    /// for the same triple.
    pub fn get_or_create_bucket(
        &mut self,
        origin_id: &EventId,
        relation_type: RelationType,
        event_type: &str,
    ) -> &mut RelationBucket {
        let capacity = self.capacity;
        let decryptor = self.decryptor.clone();
        self.buckets
            .entry(origin_id.clone())
            .or_default()
            .entry((relation_type.clone(), event_type.to_owned()))
            .or_insert_with(|| {
                debug!(origin_id = %origin_id, relation_type = %relation_type, event_type, "bucket created");
                RelationBucket::new(origin_id.clone(), relation_type, event_type, capacity)
                    .with_decryptor(decryptor)
            })
    }

    /// The bucket for a triple, if one exists.
    #[must_use]
    pub fn relations(
        &self,
        origin_id: &EventId,
        relation_type: &RelationType,
        event_type: &str,
    ) -> Option<&RelationBucket> {
        self.buckets
            .get(origin_id)?
            .get(&(relation_type.clone(), event_type.to_owned()))
    }

    /// Every bucket targeting `origin_id`.
    pub fn buckets_for(&self, origin_id: &EventId) -> impl Iterator<Item = &RelationBucket> {
        self.buckets.get(origin_id).into_iter().flat_map(HashMap::values)
    }

    /// Number of origins with at least one bucket.
    #[must_use]
    pub fn origin_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of_mut(&mut self, event: &SharedEvent) -> Option<&mut RelationBucket> {
        let relation = event.relation()?;
        self.buckets
            .get_mut(&relation.event_id)?
            .get_mut(&(relation.rel_type.clone(), event.event_type()))
    }

    /// Insert a relation event into its bucket.
    ///
    /// Events without a relation, redacted events and cancelled events are
    /// ignored. `origin` is attached to the bucket when known. Returns whether
    /// the event was routed.
    pub fn route(&mut self, event: &SharedEvent, origin: Option<&SharedEvent>) -> bool {
        let Some(relation) = event.relation() else {
            return false;
        };
        if event.is_redacted() || event.status() == SendStatus::Cancelled {
            debug!(event_id = %event.event_id(), "not aggregating redacted or cancelled event");
            return false;
        }
        let bucket = self.get_or_create_bucket(
            &relation.event_id,
            relation.rel_type.clone(),
            &event.event_type(),
        );
        if let Some(origin) = origin {
            bucket.set_origin(origin);
        }
        bucket.insert(event);
        true
    }

    /// Remove a redacted relation event from its bucket.
    pub fn route_removal(&mut self, event: &SharedEvent) {
        if let Some(bucket) = self.bucket_of_mut(event) {
            bucket.remove(event);
        }
    }

    /// Forward a send-status change to the bucket holding the event.
    pub fn route_status_change(&mut self, event: &SharedEvent) {
        if let Some(bucket) = self.bucket_of_mut(event) {
            bucket.on_status_change(event);
        }
    }

    /// Swap a local echo for its remote copy in the bucket holding the echo.
    /// Returns whether a bucket held the echo.
    pub fn replace_local_echo(&mut self, echo: &SharedEvent, remote: &SharedEvent) -> bool {
        self.bucket_of_mut(echo)
            .is_some_and(|bucket| bucket.replace_local_echo(echo, remote))
    }

    /// Attach a newly known origin to every bucket already targeting it.
    pub fn attach_origin(&mut self, origin: &SharedEvent) {
        if let Some(buckets) = self.buckets.get_mut(origin.event_id()) {
            for bucket in buckets.values_mut() {
                bucket.set_origin(origin);
            }
        }
    }
}

impl Default for RelationIndex {
    fn default() -> Self {
        Self::new(lattice_settings::RelationSettings::default().notification_capacity)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
