//! Client-side default override rules.
//!
//! Homeservers lag behind on some default rules, so the client carries its
//! own definitions and rewrites the server's ruleset with them:
//!
//! - `.m.rule.tombstone`: highlight room upgrades
//! - `.m.rule.reaction`: never notify for reactions

use lattice_core::constants::{REACTION, ROOM_TOMBSTONE};
use tracing::{debug, warn};

use crate::types::{HIGHLIGHT, PushAction, PushCondition, PushRule, PushRuleSet};

/// ID of the tombstone rule.
pub const TOMBSTONE_RULE_ID: &str = ".m.rule.tombstone";

/// ID of the reaction rule.
pub const REACTION_RULE_ID: &str = ".m.rule.reaction";

/// IDs of every client default override rule, in order.
pub const DEFAULT_OVERRIDE_RULE_IDS: &[&str] = &[TOMBSTONE_RULE_ID, REACTION_RULE_ID];

/// Whether `rule_id` names a client default override rule.
pub fn is_default_override(rule_id: &str) -> bool {
    DEFAULT_OVERRIDE_RULE_IDS.contains(&rule_id)
}

/// Build the client default override rules.
pub fn default_override_rules() -> Vec<PushRule> {
    vec![tombstone(), reaction()]
}

fn tombstone() -> PushRule {
    PushRule {
        rule_id: TOMBSTONE_RULE_ID.into(),
        default: true,
        enabled: true,
        conditions: vec![
            PushCondition::glob("type", ROOM_TOMBSTONE),
            PushCondition::glob("state_key", ""),
        ],
        actions: vec![PushAction::Notify, PushAction::tweak(HIGHLIGHT, true)],
        pattern: None,
    }
}

fn reaction() -> PushRule {
    PushRule {
        rule_id: REACTION_RULE_ID.into(),
        default: true,
        enabled: true,
        conditions: vec![PushCondition::glob("type", REACTION)],
        actions: vec![PushAction::DontNotify],
        pattern: None,
    }
}

/// Apply the client default override rules to a ruleset.
///
/// A rule the server already declares keeps its position and the user's
/// `enabled` flag; its conditions, actions and `default` flag are replaced.
/// Missing rules are inserted ahead of the server's override rules.
#[must_use]
pub fn rewrite_default_rules(incoming: &PushRuleSet) -> PushRuleSet {
    let mut rules = incoming.clone();
    let overrides = &mut rules.global.r#override;

    let mut missing = Vec::new();
    for default in default_override_rules() {
        match overrides.iter_mut().find(|r| r.rule_id == default.rule_id) {
            Some(existing) => {
                debug!(rule_id = %default.rule_id, "rewriting server override rule");
                existing.default = default.default;
                existing.conditions = default.conditions;
                existing.actions = default.actions;
            }
            None => {
                warn!(rule_id = %default.rule_id, "adding default global override");
                missing.push(default);
            }
        }
    }

    let _ = overrides.splice(0..0, missing);
    rules
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
