//! Push rule evaluation.
//!
//! [`PushProcessor`] holds the user's ruleset and answers, for one event at a
//! time, which rule applies and what that rule asks for. Rules are tried kind
//! by kind in [`PushRuleKind::IN_ORDER`] and within a kind in listed order;
//! the first enabled rule whose conditions all hold wins.

use lattice_core::{MatrixEvent, RoomState, UserId};
use lattice_settings::PushSettings;
use tracing::{debug, trace};

use crate::conditions::{ConditionContext, condition_holds};
use crate::defaults::rewrite_default_rules;
use crate::glob::GlobCache;
use crate::types::{HIGHLIGHT, PushActions, PushCondition, PushRule, PushRuleKind, PushRuleSet};

/// A rule that matched, with the kind it was found under.
#[derive(Clone, Copy, Debug)]
pub struct MatchedRule<'a> {
    /// The rule.
    pub rule: &'a PushRule,
    /// Its kind.
    pub kind: PushRuleKind,
}

/// Evaluates push rules for one user.
pub struct PushProcessor {
    user_id: UserId,
    rules: PushRuleSet,
    inject_defaults: bool,
    globs: GlobCache,
}

impl PushProcessor {
    /// Create a processor for `user_id` with the given ruleset.
    ///
    /// With `settings.inject_default_overrides` the client default override
    /// rules are applied to the ruleset first.
    pub fn new(user_id: UserId, rules: PushRuleSet, settings: &PushSettings) -> Self {
        let mut processor = Self {
            user_id,
            rules: PushRuleSet::default(),
            inject_defaults: settings.inject_default_overrides,
            globs: GlobCache::new(),
        };
        processor.set_rules(rules);
        processor
    }

    /// Create a processor using the process-wide settings.
    pub fn with_global_settings(user_id: UserId, rules: PushRuleSet) -> Self {
        Self::new(user_id, rules, &lattice_settings::get_settings().push)
    }

    /// Replace the ruleset, e.g. after a sync delivered new rules.
    pub fn set_rules(&mut self, rules: PushRuleSet) {
        self.rules = if self.inject_defaults {
            rewrite_default_rules(&rules)
        } else {
            rules
        };
        debug!(
            user_id = %self.user_id,
            rule_count = self.rules.global.iter().count(),
            "push rules installed"
        );
    }

    /// The ruleset in effect.
    #[must_use]
    pub fn rules(&self) -> &PushRuleSet {
        &self.rules
    }

    /// The user the rules belong to.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Compiled glob cache.
    #[must_use]
    pub fn glob_cache(&self) -> &GlobCache {
        &self.globs
    }

    /// Find a rule by ID across every kind.
    #[must_use]
    pub fn rule_by_id(&self, rule_id: &str) -> Option<&PushRule> {
        self.rules
            .global
            .iter()
            .find(|(_, rule)| rule.rule_id == rule_id)
            .map(|(_, rule)| rule)
    }

    /// The rule that applies to `event`, if any.
    ///
    /// The user's own events never match.
    pub fn matching_rule(
        &self,
        event: &MatrixEvent,
        room: Option<&dyn RoomState>,
    ) -> Option<MatchedRule<'_>> {
        if event.sender() == &self.user_id {
            trace!(event_id = %event.event_id(), "own event, no push rule applies");
            return None;
        }

        let ctx = ConditionContext {
            event,
            room,
            user_id: &self.user_id,
            globs: &self.globs,
        };

        for (kind, rule) in self.rules.global.iter() {
            if !rule.enabled {
                continue;
            }
            let Some(conditions) = effective_conditions(kind, rule) else {
                continue;
            };
            if conditions.iter().all(|c| condition_holds(c, &ctx)) {
                debug!(
                    event_id = %event.event_id(),
                    rule_id = %rule.rule_id,
                    kind = %kind,
                    "push rule matched"
                );
                return Some(MatchedRule { rule, kind });
            }
        }
        None
    }

    /// What to do about `event`.
    ///
    /// Without a matching rule nothing is notified. When the matching rule
    /// does not set `highlight`, content rules highlight and others don't.
    pub fn actions_for(&self, event: &MatrixEvent, room: Option<&dyn RoomState>) -> PushActions {
        let Some(matched) = self.matching_rule(event, room) else {
            return PushActions::default();
        };
        let mut actions = PushActions::from_actions(&matched.rule.actions);
        let _ = actions
            .tweaks
            .entry(HIGHLIGHT.to_owned())
            .or_insert_with(|| (matched.kind == PushRuleKind::Content).into());
        actions
    }
}

/// Conditions a rule stands for. Room, sender and content rules are
/// templates over their ID or pattern; `None` when the template can't be
/// filled.
fn effective_conditions(kind: PushRuleKind, rule: &PushRule) -> Option<Vec<PushCondition>> {
    match kind {
        PushRuleKind::Override | PushRuleKind::Underride => Some(rule.conditions.clone()),
        PushRuleKind::Room if !rule.rule_id.is_empty() => {
            Some(vec![PushCondition::exact("room_id", &rule.rule_id)])
        }
        PushRuleKind::Sender if !rule.rule_id.is_empty() => {
            Some(vec![PushCondition::exact("sender", &rule.rule_id)])
        }
        PushRuleKind::Content => rule
            .pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| vec![PushCondition::glob("content.body", p)]),
        PushRuleKind::Room | PushRuleKind::Sender => None,
    }
}

impl std::fmt::Debug for PushProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushProcessor")
            .field("user_id", &self.user_id)
            .field("rule_count", &self.rules.global.iter().count())
            .field("inject_defaults", &self.inject_defaults)
            .field("cached_globs", &self.globs.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
