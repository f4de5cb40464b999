//! Push rule wire model.
//!
//! Mirrors the JSON returned by `GET /pushrules/`. Unknown condition kinds
//! and unknown action names survive a round trip instead of failing the
//! whole ruleset.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The five rule kinds, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushRuleKind {
    /// Highest priority, arbitrary conditions.
    Override,
    /// Glob on the message body.
    Content,
    /// All events of one room.
    Room,
    /// All events of one sender.
    Sender,
    /// Lowest priority, arbitrary conditions.
    Underride,
}

impl PushRuleKind {
    /// Every kind in the order rules are evaluated.
    pub const IN_ORDER: [Self; 5] = [
        Self::Override,
        Self::Content,
        Self::Room,
        Self::Sender,
        Self::Underride,
    ];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Content => "content",
            Self::Room => "room",
            Self::Sender => "sender",
            Self::Underride => "underride",
        }
    }
}

impl fmt::Display for PushRuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One condition of a rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushCondition {
    /// Compare a dotted event field with an exact value or a glob.
    EventMatch {
        /// Dotted path, e.g. `content.body` or `type`.
        #[serde(default)]
        key: Option<String>,
        /// Glob to match against.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        /// Exact value; wins over `pattern` when both are present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// The body mentions the user's current display name.
    ContainsDisplayName,
    /// Compare the joined member count, e.g. `"2"` or `">=10"`.
    RoomMemberCount {
        /// Operator and integer.
        #[serde(default)]
        is: Option<String>,
    },
    /// The sender may trigger notifications of `key` (e.g. `room`).
    SenderNotificationPermission {
        /// Notification kind looked up in the power levels.
        #[serde(default)]
        key: Option<String>,
    },
    /// Any kind this evaluator does not know. Never matches.
    #[serde(other)]
    Unknown,
}

impl PushCondition {
    /// An `event_match` condition comparing `key` with an exact value.
    pub fn exact(key: &str, value: &str) -> Self {
        Self::EventMatch {
            key: Some(key.to_owned()),
            pattern: None,
            value: Some(value.to_owned()),
        }
    }

    /// An `event_match` condition matching `key` against a glob.
    pub fn glob(key: &str, pattern: &str) -> Self {
        Self::EventMatch {
            key: Some(key.to_owned()),
            pattern: Some(pattern.to_owned()),
            value: None,
        }
    }
}

/// What to do when a rule matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAction", into = "RawAction")]
pub enum PushAction {
    /// Notify the user.
    Notify,
    /// Do not notify.
    DontNotify,
    /// Notify, but coalesce with other notifications.
    Coalesce,
    /// Set a tweak. A missing value means `true`.
    SetTweak {
        /// Tweak name, e.g. `highlight` or `sound`.
        name: String,
        /// Tweak value.
        value: Option<Value>,
    },
    /// An action name this evaluator does not know.
    Unknown(String),
}

impl PushAction {
    /// A tweak with an explicit value.
    pub fn tweak(name: &str, value: impl Into<Value>) -> Self {
        Self::SetTweak {
            name: name.to_owned(),
            value: Some(value.into()),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawAction {
    Name(String),
    Tweak {
        set_tweak: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl From<RawAction> for PushAction {
    fn from(raw: RawAction) -> Self {
        match raw {
            RawAction::Name(name) => match name.as_str() {
                "notify" => Self::Notify,
                "dont_notify" => Self::DontNotify,
                "coalesce" => Self::Coalesce,
                _ => Self::Unknown(name),
            },
            RawAction::Tweak { set_tweak, value } => Self::SetTweak {
                name: set_tweak,
                value,
            },
        }
    }
}

impl From<PushAction> for RawAction {
    fn from(action: PushAction) -> Self {
        match action {
            PushAction::Notify => Self::Name("notify".into()),
            PushAction::DontNotify => Self::Name("dont_notify".into()),
            PushAction::Coalesce => Self::Name("coalesce".into()),
            PushAction::SetTweak { name, value } => Self::Tweak {
                set_tweak: name,
                value,
            },
            PushAction::Unknown(name) => Self::Name(name),
        }
    }
}

/// One push rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushRule {
    /// Rule ID. For room and sender rules this is the room or user ID.
    pub rule_id: String,
    /// Whether this is a server default rule.
    #[serde(default)]
    pub default: bool,
    /// Whether the user has the rule switched on. Missing means off.
    #[serde(default)]
    pub enabled: bool,
    /// Conditions of override and underride rules.
    #[serde(default)]
    pub conditions: Vec<PushCondition>,
    /// Actions applied when the rule matches.
    #[serde(default)]
    pub actions: Vec<PushAction>,
    /// Body glob of content rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Rules of one scope, grouped by kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Override rules.
    #[serde(default)]
    pub r#override: Vec<PushRule>,
    /// Content rules.
    #[serde(default)]
    pub content: Vec<PushRule>,
    /// Room rules.
    #[serde(default)]
    pub room: Vec<PushRule>,
    /// Sender rules.
    #[serde(default)]
    pub sender: Vec<PushRule>,
    /// Underride rules.
    #[serde(default)]
    pub underride: Vec<PushRule>,
}

impl Ruleset {
    /// Rules of one kind, in listed order.
    #[must_use]
    pub fn rules(&self, kind: PushRuleKind) -> &[PushRule] {
        match kind {
            PushRuleKind::Override => &self.r#override,
            PushRuleKind::Content => &self.content,
            PushRuleKind::Room => &self.room,
            PushRuleKind::Sender => &self.sender,
            PushRuleKind::Underride => &self.underride,
        }
    }

    /// Rules of one kind, mutably.
    pub fn rules_mut(&mut self, kind: PushRuleKind) -> &mut Vec<PushRule> {
        match kind {
            PushRuleKind::Override => &mut self.r#override,
            PushRuleKind::Content => &mut self.content,
            PushRuleKind::Room => &mut self.room,
            PushRuleKind::Sender => &mut self.sender,
            PushRuleKind::Underride => &mut self.underride,
        }
    }

    /// Every rule with its kind, in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (PushRuleKind, &PushRule)> {
        PushRuleKind::IN_ORDER
            .into_iter()
            .flat_map(move |kind| self.rules(kind).iter().map(move |rule| (kind, rule)))
    }
}

/// The user's push rules.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PushRuleSet {
    /// Rules applying everywhere.
    #[serde(default)]
    pub global: Ruleset,
}

/// Folded result of a rule's action list.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PushActions {
    /// Whether to notify.
    pub notify: bool,
    /// Tweaks by name.
    pub tweaks: BTreeMap<String, Value>,
}

impl PushActions {
    /// Fold an action list. Later tweaks of the same name win.
    #[must_use]
    pub fn from_actions(actions: &[PushAction]) -> Self {
        let mut folded = Self::default();
        for action in actions {
            match action {
                PushAction::Notify => folded.notify = true,
                PushAction::SetTweak { name, value } => {
                    let _ = folded
                        .tweaks
                        .insert(name.clone(), value.clone().unwrap_or(Value::Bool(true)));
                }
                PushAction::DontNotify | PushAction::Coalesce | PushAction::Unknown(_) => {}
            }
        }
        folded
    }

    /// Whether the event should be highlighted.
    #[must_use]
    pub fn highlight(&self) -> bool {
        self.tweaks
            .get(HIGHLIGHT)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Sound to play, if any.
    #[must_use]
    pub fn sound(&self) -> Option<&str> {
        self.tweaks.get("sound").and_then(Value::as_str)
    }
}

/// Name of the highlight tweak.
pub const HIGHLIGHT: &str = "highlight";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
