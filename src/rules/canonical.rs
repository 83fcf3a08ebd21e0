//! Canonical-transform rules shared by `create_tx` and `update_tx` (design
//! §4.6 step 5, §8 scenarios S1/S2).
//!
//! Each checks `changed_keys` before touching its field, per design §4.6
//! ("each rule's applies? must check changed_keys"); `ChangedKeys::All`
//! (create) always satisfies `has_changed`, so the same rule instance works
//! in both rulesets without a create/update split.

use serde_json::json;

use crate::engine::{ItemView, Rule, RuleMeta};
use crate::error::RuleError;
use crate::model::Patch;

fn nonblank_str<'a>(view: &'a ItemView<'_, '_>, field: &str) -> Option<&'a str> {
    view.payload_field(field).and_then(|v| v.as_str()).map(str::trim).filter(|s| !s.is_empty())
}

/// Reads `brand`, writes `brand_id` by looking the name up in the
/// batch-preloaded brand map. An unresolved brand drops the write entirely
/// rather than nulling the field (design §8 P5); the existing `brand_id`,
/// if any, is left untouched by omission.
pub struct BrandNameRule {
    meta: RuleMeta,
}

impl BrandNameRule {
    pub fn new(meta: RuleMeta) -> Self {
        BrandNameRule { meta: meta.with_reads(["brand"]).with_writes(["brand_id"]) }
    }
}

impl Rule for BrandNameRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn applies(&self, view: &ItemView<'_, '_>) -> bool {
        view.has_changed("brand") && nonblank_str(view, "brand").is_some()
    }

    fn apply(&self, view: &ItemView<'_, '_>) -> Result<Patch, RuleError> {
        let name = nonblank_str(view, "brand").ok_or_else(|| RuleError::new("brand missing at apply time"))?;
        match view.lookups().brand_id(name) {
            Some(id) => Ok(Patch::from_iter([("brand_id".to_string(), json!(id))])),
            None => Ok(Patch::new()),
        }
    }
}

/// Reads `strain`, writes `strain_id`. Same unresolved-drop policy as
/// [`BrandNameRule`].
pub struct StrainNameRule {
    meta: RuleMeta,
}

impl StrainNameRule {
    pub fn new(meta: RuleMeta) -> Self {
        StrainNameRule { meta: meta.with_reads(["strain"]).with_writes(["strain_id"]) }
    }
}

impl Rule for StrainNameRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn applies(&self, view: &ItemView<'_, '_>) -> bool {
        view.has_changed("strain") && nonblank_str(view, "strain").is_some()
    }

    fn apply(&self, view: &ItemView<'_, '_>) -> Result<Patch, RuleError> {
        let name = nonblank_str(view, "strain").ok_or_else(|| RuleError::new("strain missing at apply time"))?;
        match view.lookups().strain_id(name) {
            Some(id) => Ok(Patch::from_iter([("strain_id".to_string(), json!(id))])),
            None => Ok(Patch::new()),
        }
    }
}

/// Reads `tags`, writes `tag_ids`. Unlike brand/strain, each name in the
/// list is resolved independently; a name that doesn't resolve is dropped
/// from the list rather than failing the whole write, since `tag_ids` is a
/// collection, not a single foreign key.
pub struct TagNamesRule {
    meta: RuleMeta,
}

impl TagNamesRule {
    pub fn new(meta: RuleMeta) -> Self {
        TagNamesRule { meta: meta.with_reads(["tags"]).with_writes(["tag_ids"]) }
    }
}

impl Rule for TagNamesRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn applies(&self, view: &ItemView<'_, '_>) -> bool {
        view.has_changed("tags") && view.payload_field("tags").is_some_and(|v| v.is_array())
    }

    fn apply(&self, view: &ItemView<'_, '_>) -> Result<Patch, RuleError> {
        let names = view
            .payload_field("tags")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RuleError::new("tags missing at apply time"))?;
        let ids: Vec<_> = names
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|name| view.lookups().tag_id(name))
            .map(|id| json!(id))
            .collect();
        Ok(Patch::from_iter([("tag_ids".to_string(), serde_json::Value::Array(ids))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{self, FlagSnapshot};
    use crate::lookups::LookupMaps;
    use crate::model::{ChangedKeys, Payload};
    use crate::pipeline::BatchContext;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn batch_with_brand(name: &str, id: i64) -> BatchContext {
        let mut brands = BTreeMap::new();
        brands.insert(name.to_string(), id);
        BatchContext {
            now: Utc::now(),
            env: "test".to_string(),
            source_id: "treez".to_string(),
            flag_snapshot: FlagSnapshot::from_recorded(
                flags::MANIFEST.iter().map(|f| (f.to_string(), false)).collect(),
            ),
            lookups: LookupMaps { brands, strains: BTreeMap::new(), tags: BTreeMap::new() },
            ruleset_version: "v1".to_string(),
        }
    }

    #[test]
    fn brand_name_rule_resolves_known_brand() {
        let batch = batch_with_brand("Acme", 42);
        let payload = Payload::from_iter([("brand".to_string(), json!("Acme"))]);
        let changes = Patch::new();
        let view = ItemView::new(&batch, &payload, None, &ChangedKeys::All, &changes);

        let rule = BrandNameRule::new(RuleMeta::new("brand_name_rule"));
        assert!(rule.applies(&view));
        let patch = rule.apply(&view).unwrap();
        assert_eq!(patch.get("brand_id"), Some(&json!(42)));
    }

    #[test]
    fn brand_name_rule_drops_unresolved_brand() {
        let batch = batch_with_brand("Acme", 42);
        let payload = Payload::from_iter([("brand".to_string(), json!("Unknown"))]);
        let changes = Patch::new();
        let view = ItemView::new(&batch, &payload, None, &ChangedKeys::All, &changes);

        let rule = BrandNameRule::new(RuleMeta::new("brand_name_rule"));
        let patch = rule.apply(&view).unwrap();
        assert!(patch.is_empty());
    }
}
