//! Builders for common event content.
//!
//! Each helper returns the `content` object of an event, ready to hand to
//! [`MatrixEvent::local_echo`](crate::event::MatrixEvent::local_echo) or to
//! the transport.

use serde_json::{Value, json};

use crate::constants::{NEW_CONTENT, RELATES_TO, THREAD_STABLE};
use crate::ids::EventId;

/// `format` value for HTML bodies.
pub const HTML_FORMAT: &str = "org.matrix.custom.html";

fn plain(msgtype: &str, body: &str) -> Value {
    json!({ "msgtype": msgtype, "body": body })
}

fn html(msgtype: &str, body: &str, html_body: &str) -> Value {
    json!({
        "msgtype": msgtype,
        "format": HTML_FORMAT,
        "body": body,
        "formatted_body": html_body,
    })
}

/// `m.text` message.
#[must_use]
pub fn make_text_message(body: &str) -> Value {
    plain("m.text", body)
}

/// `m.notice` message.
#[must_use]
pub fn make_notice(body: &str) -> Value {
    plain("m.notice", body)
}

/// `m.emote` message.
#[must_use]
pub fn make_emote_message(body: &str) -> Value {
    plain("m.emote", body)
}

/// `m.text` message with an HTML body.
#[must_use]
pub fn make_html_message(body: &str, html_body: &str) -> Value {
    html("m.text", body, html_body)
}

/// `m.notice` message with an HTML body.
#[must_use]
pub fn make_html_notice(body: &str, html_body: &str) -> Value {
    html("m.notice", body, html_body)
}

/// `m.emote` message with an HTML body.
#[must_use]
pub fn make_html_emote(body: &str, html_body: &str) -> Value {
    html("m.emote", body, html_body)
}

/// Reaction content (`m.annotation`) for an `m.reaction` event.
#[must_use]
pub fn make_reaction(target: &EventId, key: &str) -> Value {
    json!({
        RELATES_TO: {
            "rel_type": "m.annotation",
            "event_id": target.as_str(),
            "key": key,
        }
    })
}

/// Edit of a text message. The top-level body carries the `* ` fallback.
#[must_use]
pub fn make_replacement(target: &EventId, new_body: &str) -> Value {
    json!({
        "msgtype": "m.text",
        "body": format!("* {new_body}"),
        NEW_CONTENT: make_text_message(new_body),
        RELATES_TO: {
            "rel_type": "m.replace",
            "event_id": target.as_str(),
        }
    })
}

/// Thread reply with a reply fallback to the root.
#[must_use]
pub fn make_thread_reply(root: &EventId, body: &str) -> Value {
    json!({
        "msgtype": "m.text",
        "body": body,
        RELATES_TO: {
            "rel_type": THREAD_STABLE,
            "event_id": root.as_str(),
            "is_falling_back": true,
            "m.in_reply_to": { "event_id": root.as_str() },
        }
    })
}
