//! Replay pack artifact (design §4.7, §6) and the replay runner (§4.7, P9).

use serde::{Deserialize, Serialize};

use crate::engine::RuleSet;
use crate::error::SinkError;
use crate::model::{Patch, Payload, Violations};
use crate::pipeline::BatchContext;
use crate::processor::ItemContext;

pub const PACK_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOrderEntry {
    pub name: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSnapshot {
    pub brands: std::collections::BTreeMap<String, i64>,
    pub strains: std::collections::BTreeMap<String, i64>,
    pub tags: std::collections::BTreeMap<String, i64>,
}

/// Immutable, self-contained record of everything needed to re-execute one
/// item's rule firing deterministically (design §4.7). Field names and
/// shape follow the JSON schema in design §6 exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayPack {
    pub pack_version: i32,
    pub produced_at: i64,
    pub env: String,
    pub app_version: String,
    pub git_sha: String,
    pub ruleset_version: String,
    pub flags_version: String,
    pub payload_schema_version: String,
    pub source_id: String,
    pub external_id: String,
    pub ingest_id: String,
    pub status: String,
    pub fired_rules: Vec<String>,
    pub raw_payload_normalized: Payload,
    pub mapped_payload: Payload,
    pub changed_keys: Vec<String>,
    pub changes: Patch,
    pub violations: Option<Violations>,
    pub resolver_snapshot: ResolverSnapshot,
    pub rules_order: Vec<RuleOrderEntry>,
    pub flags_snapshot: std::collections::BTreeMap<String, bool>,
}

impl ReplayPack {
    pub fn build(
        batch: &BatchContext,
        ctx: &ItemContext,
        raw_payload_normalized: &Payload,
        mapped_payload: &Payload,
        active_ruleset: Option<&RuleSet>,
    ) -> Self {
        let rules_order = active_ruleset
            .map(|rs| {
                rs.order()
                    .iter()
                    .filter_map(|name| rs.rule(name).map(|r| RuleOrderEntry { name: name.clone(), priority: r.meta().priority }))
                    .collect()
            })
            .unwrap_or_default();

        ReplayPack {
            pack_version: PACK_VERSION,
            produced_at: batch.now.timestamp(),
            env: batch.env.clone(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: option_env!("GIT_SHA").unwrap_or("unknown").to_string(),
            ruleset_version: batch.ruleset_version.clone(),
            flags_version: batch.flag_snapshot.version().to_string(),
            payload_schema_version: "1".to_string(),
            source_id: ctx.source_id.clone(),
            external_id: ctx.external_id.clone(),
            ingest_id: ctx.ingest_id.clone(),
            status: ctx.status.as_str().to_string(),
            fired_rules: ctx.fired.clone(),
            raw_payload_normalized: raw_payload_normalized.clone(),
            mapped_payload: mapped_payload.clone(),
            changed_keys: ctx.changed_keys.to_field_list(),
            changes: ctx.changes.clone(),
            violations: if ctx.violations.is_empty() { None } else { Some(ctx.violations.clone()) },
            resolver_snapshot: ResolverSnapshot {
                brands: batch.lookups.brands.clone(),
                strains: batch.lookups.strains.clone(),
                tags: batch.lookups.tags.clone(),
            },
            rules_order,
            flags_snapshot: batch.flag_snapshot.values().clone(),
        }
    }

    /// Storage-layout key (design §6): `env=.../date=.../status=.../ruleset=.../<source_id>/<external_id>/<ingest_id>.json.gz`.
    pub fn object_key(&self) -> String {
        let date = chrono::DateTime::from_timestamp(self.produced_at, 0)
            .unwrap_or_default()
            .format("%Y-%m-%d");
        format!(
            "env={}/date={}/status={}/ruleset={}/{}/{}/{}.json.gz",
            self.env, date, self.status, self.ruleset_version, self.source_id, self.external_id, self.ingest_id
        )
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("ReplayPack fields are all JSON-serializable")
    }
}

/// `put_if_absent(key, bytes) -> Result<(), SinkError>` (design §6). Only
/// this narrow interface is specified; gzip framing and the actual
/// PUT-if-absent semantics belong to the adapter.
pub trait ReplayPackSink: Send + Sync {
    fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<(), SinkError>;
}

/// Per-rule trace entry produced by the replay runner (design §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStep {
    pub rule: String,
    pub applied: bool,
    pub patch: Patch,
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayTrace {
    pub steps: Vec<ReplayStep>,
    pub state_after: Patch,
}

/// Reconstructs an `ItemContext` from a stored pack and re-executes
/// `rules_order`, reproducing `(applied, patch, conflicts, state_after)` per
/// rule (design §4.7, P9). Uses only values recorded in the pack — no live
/// service call is made, which is what makes this deterministic regardless
/// of what the real lookup/flag backends would answer today.
pub fn run(pack: &ReplayPack, ruleset: &RuleSet) -> ReplayTrace {
    use crate::engine::ItemView;
    use crate::flags::FlagSnapshot;
    use crate::lookups::LookupMaps;
    use crate::model::{ChangedKeys, MenuItemRecord};
    use crate::pipeline::BatchContext;
    use std::collections::BTreeSet;

    let lookups = LookupMaps {
        brands: pack.resolver_snapshot.brands.clone(),
        strains: pack.resolver_snapshot.strains.clone(),
        tags: pack.resolver_snapshot.tags.clone(),
    };
    let flag_snapshot = reconstruct_flag_snapshot(pack);
    let batch = BatchContext {
        now: chrono::DateTime::from_timestamp(pack.produced_at, 0).unwrap_or_default(),
        env: pack.env.clone(),
        source_id: pack.source_id.clone(),
        flag_snapshot,
        lookups,
        ruleset_version: pack.ruleset_version.clone(),
    };

    let changed_keys = if pack.changed_keys == vec!["all".to_string()] {
        ChangedKeys::All
    } else {
        ChangedKeys::Some(pack.changed_keys.iter().cloned().collect::<BTreeSet<_>>())
    };
    let menu_item = MenuItemRecord { external_id: pack.external_id.clone(), fields: pack.raw_payload_normalized.clone() };

    let mut steps = Vec::new();
    let mut state: Patch = Patch::new();
    for entry in &pack.rules_order {
        let Some(rule) = ruleset.rule(&entry.name) else { continue };
        let view = ItemView::new(&batch, &pack.mapped_payload, Some(&menu_item), &changed_keys, &state);
        if !rule.applies(&view) {
            continue;
        }
        match rule.apply(&view) {
            Ok(patch) => {
                let conflicts: Vec<String> = patch.keys().filter(|k| state.contains_key(*k)).cloned().collect();
                state.extend(patch.clone());
                steps.push(ReplayStep { rule: entry.name.clone(), applied: true, patch, conflicts });
            }
            Err(e) => {
                steps.push(ReplayStep {
                    rule: entry.name.clone(),
                    applied: false,
                    patch: Patch::new(),
                    conflicts: vec![e.to_string()],
                });
            }
        }
    }

    ReplayTrace { steps, state_after: state }
}

fn reconstruct_flag_snapshot(pack: &ReplayPack) -> crate::flags::FlagSnapshot {
    crate::flags::FlagSnapshot::from_recorded(pack.flags_snapshot.clone())
}
