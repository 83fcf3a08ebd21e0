//! Action-classification rules (design §4.6 step 3).
//!
//! These live in the external transformer's `RuleSet`, not in application
//! code, specifically so `fired_rules` reports which classification rule
//! ran (design §8 scenario S3 expects `["destroy_action_rule"]`). Each
//! writes the `action` pseudo-field the processor reads and then discards;
//! it is never part of a canonical payload.
//!
//! `is_destroy_pointer` is the Treez-shaped destroy signal from scenario S3
//! (`payload["deleted_at"]` present and non-null). A different source wires
//! up a different predicate the same way — as its own small `Rule` struct,
//! not a callback threaded through the pipeline.

use serde_json::json;

use crate::engine::{ItemView, Rule, RuleMeta};
use crate::error::RuleError;
use crate::model::Patch;

fn is_destroy_pointer(view: &ItemView<'_, '_>) -> bool {
    view.payload_field("deleted_at").is_some_and(|v| !v.is_null())
}

pub struct CreateActionRule {
    meta: RuleMeta,
}

impl CreateActionRule {
    pub fn new(meta: RuleMeta) -> Self {
        CreateActionRule { meta: meta.with_writes(["action"]) }
    }
}

impl Rule for CreateActionRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn applies(&self, view: &ItemView<'_, '_>) -> bool {
        view.menu_item().is_none() && !is_destroy_pointer(view)
    }

    fn apply(&self, _view: &ItemView<'_, '_>) -> Result<Patch, RuleError> {
        Ok(Patch::from_iter([("action".to_string(), json!("create"))]))
    }
}

pub struct UpdateActionRule {
    meta: RuleMeta,
}

impl UpdateActionRule {
    pub fn new(meta: RuleMeta) -> Self {
        UpdateActionRule { meta: meta.with_writes(["action"]) }
    }
}

impl Rule for UpdateActionRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn applies(&self, view: &ItemView<'_, '_>) -> bool {
        view.menu_item().is_some() && !is_destroy_pointer(view)
    }

    fn apply(&self, _view: &ItemView<'_, '_>) -> Result<Patch, RuleError> {
        Ok(Patch::from_iter([("action".to_string(), json!("update"))]))
    }
}

pub struct DestroyActionRule {
    meta: RuleMeta,
}

impl DestroyActionRule {
    pub fn new(meta: RuleMeta) -> Self {
        DestroyActionRule { meta: meta.with_writes(["action"]) }
    }
}

impl Rule for DestroyActionRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn applies(&self, view: &ItemView<'_, '_>) -> bool {
        view.menu_item().is_some() && is_destroy_pointer(view)
    }

    fn apply(&self, _view: &ItemView<'_, '_>) -> Result<Patch, RuleError> {
        Ok(Patch::from_iter([("action".to_string(), json!("destroy"))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{self, FlagSnapshot};
    use crate::lookups::LookupMaps;
    use crate::model::{ChangedKeys, MenuItemRecord, Payload};
    use crate::pipeline::BatchContext;
    use chrono::Utc;
    use serde_json::json as j;

    fn batch() -> BatchContext {
        BatchContext {
            now: Utc::now(),
            env: "test".to_string(),
            source_id: "treez".to_string(),
            flag_snapshot: FlagSnapshot::from_recorded(
                flags::MANIFEST.iter().map(|f| (f.to_string(), false)).collect(),
            ),
            lookups: LookupMaps::default(),
            ruleset_version: "v1".to_string(),
        }
    }

    #[test]
    fn destroy_action_rule_fires_when_pointer_present_and_record_exists() {
        let batch = batch();
        let payload = Payload::from_iter([("deleted_at".to_string(), j!("2025-01-01"))]);
        let existing = MenuItemRecord { external_id: "X3".to_string(), fields: Payload::new() };
        let changes = Patch::new();
        let no_changed_keys = ChangedKeys::empty();
        let view = ItemView::new(&batch, &payload, Some(&existing), &no_changed_keys, &changes);

        let rule = DestroyActionRule::new(RuleMeta::new("destroy_action_rule"));
        assert!(rule.applies(&view));
        let patch = rule.apply(&view).unwrap();
        assert_eq!(patch.get("action"), Some(&j!("destroy")));
    }

    #[test]
    fn create_action_rule_does_not_fire_for_existing_record() {
        let batch = batch();
        let payload = Payload::new();
        let existing = MenuItemRecord { external_id: "X1".to_string(), fields: Payload::new() };
        let changes = Patch::new();
        let no_changed_keys = ChangedKeys::empty();
        let view = ItemView::new(&batch, &payload, Some(&existing), &no_changed_keys, &changes);

        let rule = CreateActionRule::new(RuleMeta::new("create_action_rule"));
        assert!(!rule.applies(&view));
    }
}
