//! Item Processor state machine (C6, design §4.6).

use std::collections::BTreeSet;

use tracing::{debug, debug_span};
use uuid::Uuid;

use crate::contracts::Contract;
use crate::engine::{ItemView, RuleSet};
use crate::error::{EvalError, RejectionKind};
use crate::model::{Action, ChangedKeys, MenuItemRecord, Patch, Payload, Status, Value, Violations};
use crate::pipeline::BatchContext;
use crate::ports::{DestroyReason, PersistenceGateway};
use crate::replay::ReplayPack;

/// Pseudo-field the external transformer's classification rules
/// (`CreateActionRule`/`UpdateActionRule`/`DestroyActionRule`) write into
/// their patch to report the action they classified (design §4.6 step 3).
/// It is consumed here and never reaches `mapped_payload` or any canonical
/// contract.
const ACTION_FIELD: &str = "action";

/// Frozen value threaded through the Processor stages (design §3). Each
/// stage consumes one and produces a successor; nothing here is ever
/// mutated in place once a stage has returned it.
#[derive(Debug, Clone)]
pub struct ItemContext {
    pub payload: Payload,
    pub menu_item: Option<MenuItemRecord>,
    pub changed_keys: ChangedKeys,
    pub action: Action,
    pub status: Status,
    pub fired: Vec<String>,
    pub violations: Violations,
    pub changes: Patch,
    pub external_id: String,
    pub ingest_id: String,
    pub source_id: String,
}

impl ItemContext {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }
}

pub struct ItemOutcome {
    pub external_id: String,
    pub status: Status,
    pub fired_rules: Vec<String>,
    pub violations: Violations,
    pub replay_pack: ReplayPack,
}

pub struct Processor<'a> {
    pub batch: &'a BatchContext,
    pub raw_contract: &'a dyn Contract,
    pub canonical_contract: &'a dyn Contract,
    pub external_transformer: &'a RuleSet,
    pub create_tx: &'a RuleSet,
    pub update_tx: &'a RuleSet,
    pub persistence: &'a dyn PersistenceGateway,
    pub silent_fields: &'a BTreeSet<String>,
}

impl<'a> Processor<'a> {
    pub fn run(&self, raw_payload: &Payload) -> ItemOutcome {
        let external_id = raw_payload.get("external_id").and_then(Value::as_str).unwrap_or_default().to_string();
        let _span = debug_span!("item", external_id = %external_id).entered();
        let ingest_id = Uuid::new_v4().to_string();

        let mut ctx = ItemContext {
            payload: raw_payload.clone(),
            menu_item: None,
            changed_keys: ChangedKeys::empty(),
            action: Action::Unset,
            status: Status::Processing,
            fired: Vec::new(),
            violations: Violations::new(),
            changes: Patch::new(),
            external_id: external_id.clone(),
            ingest_id,
            source_id: self.batch.source_id.clone(),
        };

        // Stage 2: raw validation.
        let raw_violations = self.raw_contract.check(&ctx.payload);
        if !raw_violations.is_empty() {
            ctx.violations = raw_violations;
            ctx.status = Status::Rejected;
            ctx.fired = vec!["raw_validation".to_string()];
            let normalized = ctx.payload.clone();
            return self.observe(ctx, &normalized, &normalized, None);
        }

        let raw_payload_normalized = ctx.payload.clone();

        match self.persistence.find(&external_id) {
            Ok(found) => ctx.menu_item = found,
            Err(e) => {
                ctx.violations.entry(RejectionKind::PersistenceError.violation_key().to_string()).or_default().push(e);
                ctx.status = Status::Rejected;
                return self.observe(ctx, &raw_payload_normalized, &raw_payload_normalized, None);
            }
        }

        // Stage 3: external transform & action classification.
        let (mapped_changes, mapped_fired) = match self.external_transformer.evaluate(
            &mut ctx.changed_keys,
            |changes, changed_keys| ItemView::new(self.batch, &ctx.payload, ctx.menu_item.as_ref(), changed_keys, changes),
        ) {
            Ok(result) => result,
            Err(e) => {
                record_eval_error(&mut ctx.violations, &e);
                ctx.status = Status::Rejected;
                return self.observe(
                    ctx,
                    &raw_payload_normalized,
                    &raw_payload_normalized,
                    Some(self.external_transformer),
                );
            }
        };
        ctx.fired.extend(mapped_fired);
        ctx.action = match mapped_changes.get(ACTION_FIELD).and_then(Value::as_str) {
            Some("create") => Action::Create,
            Some("update") => Action::Update,
            Some("destroy") => Action::Destroy,
            _ => Action::Unset,
        };
        let mut field_changes = mapped_changes;
        field_changes.remove(ACTION_FIELD);
        let mapped_payload = merge_payload(&ctx.payload, &field_changes);

        if matches!(ctx.action, Action::Unset) {
            ctx.violations.entry("action".to_string()).or_default().push("unclassifiable".to_string());
            ctx.status = Status::Rejected;
            return self.observe(ctx, &raw_payload_normalized, &mapped_payload, Some(self.external_transformer));
        }

        // Stage 4: changeset computation.
        ctx.changed_keys = match ctx.action {
            Action::Create => ChangedKeys::All,
            Action::Destroy => ChangedKeys::empty(),
            Action::Update => {
                let existing = ctx.menu_item.as_ref().map(|m| &m.fields);
                ChangedKeys::Some(diff_payload(existing, &mapped_payload))
            }
            Action::Unset => unreachable!("handled above"),
        };

        // Stage 5: canonical transform.
        let active_ruleset: Option<&RuleSet> = match ctx.action {
            Action::Create => Some(self.create_tx),
            Action::Update => Some(self.update_tx),
            Action::Destroy => None,
            Action::Unset => unreachable!("handled above"),
        };
        let tx_result = match ctx.action {
            Action::Create => Some(self.create_tx.evaluate(&mut ctx.changed_keys, |changes, changed_keys| {
                ItemView::new(self.batch, &mapped_payload, ctx.menu_item.as_ref(), changed_keys, changes)
            })),
            Action::Update => Some(self.update_tx.evaluate(&mut ctx.changed_keys, |changes, changed_keys| {
                ItemView::new(self.batch, &mapped_payload, ctx.menu_item.as_ref(), changed_keys, changes)
            })),
            Action::Destroy => None,
            Action::Unset => unreachable!("handled above"),
        };
        match tx_result {
            Some(Ok((changes, fired))) => {
                ctx.changes = changes;
                ctx.fired.extend(fired);
            }
            Some(Err(e)) => {
                record_eval_error(&mut ctx.violations, &e);
                ctx.status = Status::Rejected;
                return self.observe(ctx, &raw_payload_normalized, &mapped_payload, active_ruleset);
            }
            None => {}
        }

        // Stage 6: canonical validation (skipped for destroy: no canonical shape is produced).
        if !matches!(ctx.action, Action::Destroy) {
            let projection = merge_payload(&mapped_payload, &ctx.changes);
            let canonical_violations = self.canonical_contract.check(&projection);
            if !canonical_violations.is_empty() {
                ctx.violations = canonical_violations;
                ctx.status = Status::Rejected;
                return self.observe(ctx, &raw_payload_normalized, &mapped_payload, active_ruleset);
            }
        }

        // Stage 7: persistence.
        let persist_result = match ctx.action {
            Action::Create => self.persistence.insert(&external_id, &ctx.changes).map(|_| Status::Created),
            Action::Update => {
                if ctx.changes.is_empty() {
                    Ok(Status::Noop)
                } else {
                    let silent = ctx.changes.keys().all(|k| self.silent_fields.contains(k));
                    debug!(external_id = %external_id, silent, "selecting persistence path");
                    self.persistence.update(&external_id, &ctx.changes, silent).map(|_| Status::Updated)
                }
            }
            Action::Destroy => self
                .persistence
                .soft_delete(&external_id, DestroyReason::SourceDeletePointer)
                .map(|_| Status::Destroyed),
            Action::Unset => unreachable!("handled above"),
        };

        match persist_result {
            Ok(status) => ctx.status = status,
            Err(e) => {
                ctx.violations.entry(RejectionKind::PersistenceError.violation_key().to_string()).or_default().push(e);
                ctx.status = Status::Rejected;
            }
        }

        // Stage 8: observe.
        self.observe(ctx, &raw_payload_normalized, &mapped_payload, active_ruleset)
    }

    fn observe(
        &self,
        ctx: ItemContext,
        raw_payload_normalized: &Payload,
        mapped_payload: &Payload,
        active_ruleset: Option<&RuleSet>,
    ) -> ItemOutcome {
        let pack = ReplayPack::build(self.batch, &ctx, raw_payload_normalized, mapped_payload, active_ruleset);
        ItemOutcome {
            external_id: ctx.external_id.clone(),
            status: ctx.status,
            fired_rules: ctx.fired.clone(),
            violations: ctx.violations.clone(),
            replay_pack: pack,
        }
    }
}

/// Routes an `EvalError` into `violations` per the rejection taxonomy
/// (design §7): `RuleFailed` keys by the failing rule's own name so a
/// caller can tell which rule broke without parsing the message, `Conflict`
/// goes under the distinct `rule_conflict` category rather than the
/// generic transform bucket.
fn record_eval_error(violations: &mut Violations, err: &EvalError) {
    let key = match err {
        EvalError::RuleFailed(name, _) => format!("rule_error.{name}"),
        EvalError::Conflict(_) => RejectionKind::RuleConflict.violation_key().to_string(),
    };
    violations.entry(key).or_default().push(err.to_string());
}

fn merge_payload(base: &Payload, patch: &Patch) -> Payload {
    let mut merged = base.clone();
    for (k, v) in patch {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Semantic diff (design §4.6 step 4): fields whose values differ, treating
/// a missing field and an empty array as equal so that, e.g., an upstream
/// payload that omits `tags` doesn't spuriously "change" a record whose
/// `tag_ids` is `[]`.
fn diff_payload(existing: Option<&Payload>, incoming: &Payload) -> BTreeSet<String> {
    let existing = match existing {
        None => return incoming.keys().cloned().collect(),
        Some(e) => e,
    };
    let mut changed = BTreeSet::new();
    for (key, new_value) in incoming {
        let old_value = existing.get(key);
        if !values_semantically_equal(old_value, Some(new_value)) {
            changed.insert(key.clone());
        }
    }
    changed
}

fn values_semantically_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (None, Some(v)) | (Some(v), None) => is_blank(v),
        (Some(a), Some(b)) => a == b,
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(arr) => arr.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_treats_missing_and_empty_array_as_equal() {
        let existing = Payload::from_iter([("tag_ids".to_string(), json!([]))]);
        let incoming = Payload::from_iter([("tag_ids".to_string(), json!([]))]);
        assert!(diff_payload(Some(&existing), &incoming).is_empty());
    }

    #[test]
    fn diff_detects_changed_scalar() {
        let existing = Payload::from_iter([("price_cents".to_string(), json!(500))]);
        let incoming = Payload::from_iter([("price_cents".to_string(), json!(600))]);
        let changed = diff_payload(Some(&existing), &incoming);
        assert!(changed.contains("price_cents"));
    }

    #[test]
    fn diff_for_create_is_everything() {
        let incoming = Payload::from_iter([("name".to_string(), json!("Blue Dream"))]);
        let changed = diff_payload(None, &incoming);
        assert_eq!(changed, BTreeSet::from(["name".to_string()]));
    }
}
