//! Reaction grouping for `m.annotation` buckets.
//!
//! Two views are maintained on every insert and remove:
//!
//! - by key, sorted by descending group size. Equal sizes keep the order in
//!   which each key group was first created, even if the group has since
//!   emptied and refilled.
//! - by sender, ordered by user ID.
//!
//! Empty groups are dropped from both views.

use std::collections::{BTreeMap, HashMap};

use lattice_core::{EventId, SharedEvent, UserId};

/// All reactions with the same key.
#[derive(Clone, Debug)]
pub struct AnnotationGroup {
    key: String,
    seq: u64,
    events: Vec<SharedEvent>,
}

impl AnnotationGroup {
    /// The reaction key (usually an emoji).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reactions in insertion order.
    #[must_use]
    pub fn events(&self) -> &[SharedEvent] {
        &self.events
    }

    /// Number of reactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the group is empty. Never true for a group returned by a view.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct AnnotationAggregate {
    by_key: Vec<AnnotationGroup>,
    by_sender: BTreeMap<UserId, Vec<SharedEvent>>,
    key_seq: HashMap<String, u64>,
    next_seq: u64,
}

fn remove_by_id(events: &mut Vec<SharedEvent>, id: &EventId) -> bool {
    let before = events.len();
    events.retain(|e| e.event_id() != id);
    events.len() != before
}

impl AnnotationAggregate {
    pub(crate) fn grouped_by_key(&self) -> &[AnnotationGroup] {
        &self.by_key
    }

    pub(crate) fn grouped_by_sender(&self) -> &BTreeMap<UserId, Vec<SharedEvent>> {
        &self.by_sender
    }

    pub(crate) fn add(&mut self, key: &str, event: &SharedEvent) {
        let seq = match self.key_seq.get(key) {
            Some(seq) => *seq,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let _ = self.key_seq.insert(key.to_owned(), seq);
                seq
            }
        };

        if let Some(group) = self.by_key.iter_mut().find(|g| g.key == key) {
            group.events.push(SharedEvent::clone(event));
        } else {
            self.by_key.push(AnnotationGroup {
                key: key.to_owned(),
                seq,
                events: vec![SharedEvent::clone(event)],
            });
        }
        self.sort();

        self.by_sender
            .entry(event.sender().clone())
            .or_default()
            .push(SharedEvent::clone(event));
    }

    pub(crate) fn remove(&mut self, key: &str, event: &SharedEvent) {
        let id = event.event_id();
        if let Some(group) = self.by_key.iter_mut().find(|g| g.key == key) {
            let _ = remove_by_id(&mut group.events, id);
        }
        self.by_key.retain(|g| !g.events.is_empty());
        self.sort();

        if let Some(events) = self.by_sender.get_mut(event.sender()) {
            let _ = remove_by_id(events, id);
            if events.is_empty() {
                let _ = self.by_sender.remove(event.sender());
            }
        }
    }

    /// Swap `old` for `new` in place, keeping group sizes and order.
    pub(crate) fn replace(&mut self, key: &str, old: &SharedEvent, new: &SharedEvent) {
        let id = old.event_id();
        let swap = |events: &mut Vec<SharedEvent>| {
            if let Some(slot) = events.iter_mut().find(|e| e.event_id() == id) {
                *slot = SharedEvent::clone(new);
            }
        };
        if let Some(group) = self.by_key.iter_mut().find(|g| g.key == key) {
            swap(&mut group.events);
        }
        if let Some(events) = self.by_sender.get_mut(old.sender()) {
            swap(events);
        }
    }

    fn sort(&mut self) {
        self.by_key
            .sort_by(|a, b| b.events.len().cmp(&a.events.len()).then(a.seq.cmp(&b.seq)));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
