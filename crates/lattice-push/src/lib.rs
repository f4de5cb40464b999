//! # lattice-push
//!
//! Push rule evaluation.
//!
//! - Wire model for the user's ruleset ([`PushRuleSet`])
//! - Condition evaluation: `event_match`, `contains_display_name`,
//!   `room_member_count`, `sender_notification_permission`
//! - [`PushProcessor`]: rule precedence and action folding
//! - Client default override rules (tombstone, reaction)
//!
//! Unknown condition kinds never match.

#![deny(unsafe_code)]

pub mod conditions;
pub mod defaults;
pub mod errors;
pub mod glob;
pub mod processor;
pub mod types;

pub use defaults::{default_override_rules, rewrite_default_rules};
pub use errors::{PushError, Result};
pub use glob::GlobCache;
pub use processor::{MatchedRule, PushProcessor};
pub use types::{
    PushAction, PushActions, PushCondition, PushRule, PushRuleKind, PushRuleSet, Ruleset,
};
