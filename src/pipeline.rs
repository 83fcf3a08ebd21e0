//! Pipeline & BatchContext (C7, design §4.3, §4.7).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{info_span, warn};

use crate::contracts::Contract;
use crate::engine::RuleSet;
use crate::error::BatchFatalError;
use crate::flags::{self, FlagBackend, FlagSnapshot};
use crate::lookups::{LookupBackend, LookupMaps, Preloader};
use crate::model::{Payload, Status};
use crate::ports::PersistenceGateway;
use crate::processor::{ItemOutcome, Processor};
use crate::replay::ReplayPackSink;

/// Frozen per-batch state (design §3, §4.3). Every item in the batch
/// observes identical values; nothing here is mutated after
/// `Pipeline::call` builds it (P10).
pub struct BatchContext {
    pub now: DateTime<Utc>,
    pub env: String,
    pub source_id: String,
    pub flag_snapshot: FlagSnapshot,
    pub lookups: LookupMaps,
    pub ruleset_version: String,
}

/// Tunables a caller sets once, independent of any particular batch.
pub struct BatchConfig {
    pub concurrency: usize,
    pub env: String,
    /// Canonical fields whose updates bypass hooks/callbacks (design §9
    /// "silent attributes", §8 P6).
    pub silent_fields: BTreeSet<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            concurrency: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            env: "production".to_string(),
            silent_fields: BTreeSet::new(),
        }
    }
}

/// Structure common to both source Pipeline variants the design notes
/// describe (design §9 Open Questions, decision 2): one `Pipeline`
/// parameterized by the raw/canonical contracts and per-action RuleSets.
///
/// Action classification (create/update/destroy, including the
/// source-specific "destroy pointer" predicate) lives inside
/// `external_transformer` as `CreateActionRule`/`UpdateActionRule`/
/// `DestroyActionRule` rather than as a separate closure here — that keeps
/// `fired_rules` accurate for S3 (`["destroy_action_rule"]`) and keeps the
/// predicate itself swappable per source the same way every other rule is.
pub struct Pipeline {
    config: BatchConfig,
    raw_contract: Box<dyn Contract>,
    canonical_contract: Box<dyn Contract>,
    external_transformer: RuleSet,
    create_tx: RuleSet,
    update_tx: RuleSet,
    lookup_backend: Box<dyn LookupBackend>,
    flag_backend: Box<dyn FlagBackend>,
    persistence: Box<dyn PersistenceGateway>,
    replay_sink: Box<dyn ReplayPackSink>,
    known_flags: BTreeSet<String>,
}

pub struct BatchCounters {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
    pub noop: usize,
    pub rejected: usize,
}

pub struct BatchOutcome {
    pub items: Vec<ItemOutcome>,
}

impl BatchOutcome {
    pub fn counts(&self) -> BatchCounters {
        let mut counters = BatchCounters { created: 0, updated: 0, destroyed: 0, noop: 0, rejected: 0 };
        for item in &self.items {
            match item.status {
                Status::Created => counters.created += 1,
                Status::Updated => counters.updated += 1,
                Status::Destroyed => counters.destroyed += 1,
                Status::Noop => counters.noop += 1,
                Status::Rejected => counters.rejected += 1,
                Status::Queued | Status::Processing => {}
            }
        }
        counters
    }
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BatchConfig,
        raw_contract: Box<dyn Contract>,
        canonical_contract: Box<dyn Contract>,
        external_transformer: RuleSet,
        create_tx: RuleSet,
        update_tx: RuleSet,
        lookup_backend: Box<dyn LookupBackend>,
        flag_backend: Box<dyn FlagBackend>,
        persistence: Box<dyn PersistenceGateway>,
        replay_sink: Box<dyn ReplayPackSink>,
    ) -> Self {
        let known_flags = flags::MANIFEST.iter().map(|s| s.to_string()).collect();
        Pipeline {
            config,
            raw_contract,
            canonical_contract,
            external_transformer,
            create_tx,
            update_tx,
            lookup_backend,
            flag_backend,
            persistence,
            replay_sink,
            known_flags,
        }
    }

    /// `Pipeline.call(items, source_id)` (design §4.7). Filters duplicates,
    /// builds the frozen `BatchContext`, then runs every surviving item
    /// through the Processor on a bounded scoped-thread pool (design §5).
    pub fn call(&self, items: Vec<Payload>, source_id: &str) -> Result<BatchOutcome, BatchFatalError> {
        let _span = info_span!("batch", source_id, ruleset_version = %self.create_tx.version()).entered();

        if items.is_empty() {
            return Ok(BatchOutcome { items: Vec::new() });
        }

        let filtered = filter_duplicates(items);

        let lookups = Preloader::new(self.lookup_backend.as_ref())
            .preload(&filtered)
            .map_err(BatchFatalError::Lookup)?;
        let flag_snapshot = flags::snapshot(self.flag_backend.as_ref(), source_id, &self.config.env)
            .map_err(BatchFatalError::Flag)?;

        let batch = BatchContext {
            now: Utc::now(),
            env: self.config.env.clone(),
            source_id: source_id.to_string(),
            flag_snapshot,
            lookups,
            ruleset_version: self.create_tx.version().to_string(),
        };

        let processor = Processor {
            batch: &batch,
            raw_contract: self.raw_contract.as_ref(),
            canonical_contract: self.canonical_contract.as_ref(),
            external_transformer: &self.external_transformer,
            create_tx: &self.create_tx,
            update_tx: &self.update_tx,
            persistence: self.persistence.as_ref(),
            silent_fields: &self.config.silent_fields,
        };

        let pool_size = self.config.concurrency.max(1).min(filtered.len());
        let outcomes = std::thread::scope(|scope| -> Vec<ItemOutcome> {
            let chunks = split_round_robin(&filtered, pool_size);
            let handles: Vec<_> = chunks
                .into_iter()
                .map(|chunk| {
                    let processor = &processor;
                    scope.spawn(move || {
                        chunk.into_iter().map(|(idx, payload)| (idx, processor.run(payload))).collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut indexed: Vec<(usize, ItemOutcome)> =
                handles.into_iter().flat_map(|h| h.join().expect("processor thread must not panic")).collect();
            indexed.sort_by_key(|(idx, _)| *idx);
            indexed.into_iter().map(|(_, outcome)| outcome).collect()
        });

        for outcome in &outcomes {
            let pack = outcome.replay_pack.clone();
            let key = pack.object_key();
            if let Err(e) = self.replay_sink.put_if_absent(&key, &pack.to_json_bytes()) {
                warn!(external_id = %outcome.external_id, error = %e, "replay pack sink failed");
            }
        }

        Ok(BatchOutcome { items: outcomes })
    }
}

/// Filter (batch-level, design §4.6 stage 1): first occurrence per
/// `external_id` wins, input order otherwise preserved.
fn filter_duplicates(items: Vec<Payload>) -> Vec<Payload> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let external_id = item.get("external_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        if seen.insert(external_id) {
            out.push(item);
        }
    }
    out
}

fn split_round_robin(items: &[Payload], pool_size: usize) -> Vec<Vec<(usize, &Payload)>> {
    let mut chunks: Vec<Vec<(usize, &Payload)>> = (0..pool_size).map(|_| Vec::new()).collect();
    for (idx, item) in items.iter().enumerate() {
        chunks[idx % pool_size].push((idx, item));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_duplicates_keeps_first_occurrence() {
        let items = vec![
            Payload::from_iter([("external_id".to_string(), json!("X1")), ("name".to_string(), json!("first"))]),
            Payload::from_iter([("external_id".to_string(), json!("X1")), ("name".to_string(), json!("second"))]),
            Payload::from_iter([("external_id".to_string(), json!("X2"))]),
        ];
        let filtered = filter_duplicates(items);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].get("name").unwrap(), &json!("first"));
    }
}
