//! Relation descriptors and server bundled aggregations.
//!
//! A relation is declared in an event's content under `m.relates_to`:
//!
//! ```json
//! { "m.relates_to": { "rel_type": "m.annotation", "event_id": "$origin", "key": "👍" } }
//! ```
//!
//! The descriptor stays in cleartext for encrypted events, so it can be read
//! before decryption. Relation kinds form the closed set of [`RelationType`];
//! kinds this SDK does not aggregate are kept as [`RelationType::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::constants::{BUNDLED_RELATIONS, RELATES_TO, THREAD_STABLE, THREAD_UNSTABLE};
use crate::ids::{EventId, UserId};

/// The kind of a relation between two events.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationType {
    /// `m.annotation`: reactions, grouped by key.
    Annotation,
    /// `m.replace`: edits of the origin event.
    Replace,
    /// `m.reference`: plain references, membership only.
    Reference,
    /// `m.thread` (or the unstable `io.element.thread`): thread replies.
    Thread,
    /// Any other relation type, kept verbatim.
    Unknown(String),
}

impl RelationType {
    /// Parse a wire relation type. Both thread names map to [`Self::Thread`].
    pub fn parse(s: &str) -> Self {
        match s {
            "m.annotation" => Self::Annotation,
            "m.replace" => Self::Replace,
            "m.reference" => Self::Reference,
            THREAD_STABLE | THREAD_UNSTABLE => Self::Thread,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// Wire name. Threads use the stable name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Annotation => "m.annotation",
            Self::Replace => "m.replace",
            Self::Reference => "m.reference",
            Self::Thread => THREAD_STABLE,
            Self::Unknown(s) => s,
        }
    }

    /// Whether this is the thread relation.
    #[must_use]
    pub fn is_thread(&self) -> bool {
        matches!(self, Self::Thread)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RelationType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<RelationType> for String {
    fn from(rt: RelationType) -> Self {
        rt.as_str().to_owned()
    }
}

/// Wire name of the thread relation for outgoing requests.
#[must_use]
pub fn thread_relation_name(prefer_stable: bool) -> &'static str {
    if prefer_stable {
        THREAD_STABLE
    } else {
        THREAD_UNSTABLE
    }
}

/// A relation descriptor: `{relationType, targetEventId, key?}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// The relation kind.
    pub rel_type: RelationType,
    /// The origin event this relation points at.
    pub event_id: EventId,
    /// Annotation key (reactions only).
    pub key: Option<String>,
}

impl Relation {
    /// Extract the descriptor from an event content object.
    ///
    /// Returns `None` unless both `rel_type` and `event_id` are strings. A bare
    /// `m.in_reply_to` without `rel_type` is a reply fallback, not a relation.
    pub fn from_content(content: &Value) -> Option<Self> {
        let relates_to = content.get(RELATES_TO)?;
        let rel_type = relates_to.get("rel_type").and_then(Value::as_str)?;
        let event_id = relates_to.get("event_id").and_then(Value::as_str)?;
        Some(Self {
            rel_type: RelationType::parse(rel_type),
            event_id: EventId::from(event_id),
            key: relates_to
                .get("key")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        })
    }
}

/// Server summary of the latest edit of an event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledReplacement {
    /// ID of the latest replacement known to the server.
    #[serde(default)]
    pub event_id: Option<EventId>,
    /// Server timestamp of that replacement.
    #[serde(default)]
    pub origin_server_ts: Option<u64>,
    /// Sender of that replacement.
    #[serde(default)]
    pub sender: Option<UserId>,
}

/// Server summary of a thread, attached to its root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundledThreadSummary {
    /// Number of replies the server has seen.
    pub count: usize,
    /// Snapshot of the latest reply.
    pub latest_event: Value,
    /// Whether the requesting user has replied in the thread.
    #[serde(default)]
    pub current_user_participated: bool,
}

/// Server bundled aggregations parsed from `unsigned["m.relations"]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BundledAggregations {
    /// Latest edit summary.
    pub replace: Option<BundledReplacement>,
    /// Thread summary (stable or unstable key).
    pub thread: Option<BundledThreadSummary>,
}

impl BundledAggregations {
    /// Parse from an event's `unsigned` object. Malformed entries are skipped.
    pub fn from_unsigned(unsigned: Option<&Value>) -> Self {
        let Some(relations) = unsigned.and_then(|u| u.get(BUNDLED_RELATIONS)) else {
            return Self::default();
        };

        let replace = relations
            .get("m.replace")
            .and_then(|v| parse_bundle::<BundledReplacement>("m.replace", v));
        let thread = relations
            .get(THREAD_STABLE)
            .or_else(|| relations.get(THREAD_UNSTABLE))
            .and_then(|v| parse_bundle::<BundledThreadSummary>("thread", v));

        Self { replace, thread }
    }

    /// Whether no aggregation was bundled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replace.is_none() && self.thread.is_none()
    }
}

fn parse_bundle<T: serde::de::DeserializeOwned>(name: &str, value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(bundle = name, error = %e, "ignoring malformed bundled aggregation");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
