//! Condition evaluation.
//!
//! Every condition evaluates to a plain `bool`. Missing data (no room state,
//! a path that does not resolve to a string, an unparsable member count)
//! means the condition does not hold.

use lattice_core::{MatrixEvent, RoomState, UserId};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::glob::GlobCache;
use crate::types::PushCondition;

/// Everything a condition may look at.
pub struct ConditionContext<'a> {
    /// The event being evaluated.
    pub event: &'a MatrixEvent,
    /// Current state of the event's room, if known.
    pub room: Option<&'a dyn RoomState>,
    /// The user the rules belong to.
    pub user_id: &'a UserId,
    /// Compiled globs.
    pub globs: &'a GlobCache,
}

/// Resolve a dotted key against an event.
///
/// `content.*` reads the decrypted content when available and `type` the
/// effective event type. `room_id` and `sender` come from the event itself;
/// any other first segment walks the raw wire JSON.
pub fn value_for_dotted_key(event: &MatrixEvent, key: &str) -> Option<Value> {
    let mut parts = key.split('.');
    let first = parts.next()?;
    let mut value = match first {
        "content" => event.content(),
        "type" => Value::String(event.event_type()),
        "room_id" => Value::String(event.room_id().to_string()),
        "sender" => Value::String(event.sender().to_string()),
        _ => event.raw().get(first)?.clone(),
    };
    for part in parts {
        value = value.get(part)?.clone();
    }
    if value.is_null() { None } else { Some(value) }
}

/// Whether `condition` holds for the event in `ctx`.
pub fn condition_holds(condition: &PushCondition, ctx: &ConditionContext<'_>) -> bool {
    match condition {
        PushCondition::EventMatch {
            key,
            pattern,
            value,
        } => event_match(ctx, key.as_deref(), pattern.as_deref(), value.as_deref()),
        PushCondition::ContainsDisplayName => contains_display_name(ctx),
        PushCondition::RoomMemberCount { is } => {
            let (Some(is), Some(room)) = (is.as_deref(), ctx.room) else {
                return false;
            };
            member_count_matches(is, room.joined_member_count())
        }
        PushCondition::SenderNotificationPermission { key } => {
            let (Some(key), Some(room)) = (key.as_deref(), ctx.room) else {
                return false;
            };
            room.may_trigger_notif_of_type(key, ctx.event.sender())
        }
        PushCondition::Unknown => {
            debug!(event_id = %ctx.event.event_id(), "unknown push condition, not matching");
            false
        }
    }
}

fn event_match(
    ctx: &ConditionContext<'_>,
    key: Option<&str>,
    pattern: Option<&str>,
    value: Option<&str>,
) -> bool {
    let Some(key) = key else {
        return false;
    };
    let Some(Value::String(actual)) = value_for_dotted_key(ctx.event, key) else {
        return false;
    };
    if let Some(expected) = value {
        return actual == expected;
    }
    let Some(pattern) = pattern else {
        return false;
    };
    match ctx.globs.is_match(pattern, key == "content.body", &actual) {
        Ok(matched) => matched,
        Err(e) => {
            warn!(key, error = %e, "ignoring push condition with invalid glob");
            false
        }
    }
}

/// Regex matching `name` as a whole word, case-insensitively.
pub fn mention_regex(name: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(r"(?i)(^|\W){}(\W|$)", regex::escape(name)))?)
}

fn contains_display_name(ctx: &ConditionContext<'_>) -> bool {
    let content = ctx.event.content();
    let Some(body) = content.get("body").and_then(Value::as_str) else {
        return false;
    };
    let Some(member) = ctx.room.and_then(|room| room.member(ctx.user_id)) else {
        return false;
    };
    let name = member
        .display_name
        .unwrap_or_else(|| ctx.user_id.to_string());
    if name.is_empty() {
        return false;
    }
    match mention_regex(&name) {
        Ok(re) => re.is_match(body),
        Err(e) => {
            warn!(error = %e, "could not build display name pattern");
            false
        }
    }
}

/// Compare a joined member count with a compact `[op]N` expression.
///
/// Operators are `==`, `<`, `>`, `<=` and `>=`; no operator means `==`.
pub fn member_count_matches(is: &str, count: u64) -> bool {
    let split = is.find(|c: char| c.is_ascii_digit()).unwrap_or(is.len());
    let (op, rhs) = is.split_at(split);
    if !rhs.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let Ok(rhs) = rhs.parse::<u64>() else {
        return false;
    };
    match op {
        "" | "==" => count == rhs,
        "<" => count < rhs,
        ">" => count > rhs,
        "<=" => count <= rhs,
        ">=" => count >= rhs,
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
