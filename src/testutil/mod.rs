//! In-memory fakes for every injected port (SPEC_FULL §10.4). These double
//! as unit-test fixtures and as the wiring the CLI demonstration binary
//! uses — not `#[cfg(test)]`-gated, since `main.rs` needs them too.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::SinkError;
use crate::flags::FlagBackend;
use crate::lookups::LookupBackend;
use crate::model::{MenuItemRecord, Patch};
use crate::ports::{DestroyReason, PersistenceGateway};
use crate::replay::ReplayPackSink;

#[derive(Debug, Clone, Default)]
pub struct FakeLookupBackend {
    pub brands: BTreeMap<String, i64>,
    pub strains: BTreeMap<String, i64>,
    pub tags: BTreeMap<String, i64>,
}

impl LookupBackend for FakeLookupBackend {
    fn fetch_brands(&self, names: &std::collections::BTreeSet<String>) -> Result<BTreeMap<String, i64>, String> {
        Ok(names.iter().filter_map(|n| self.brands.get(n).map(|id| (n.clone(), *id))).collect())
    }

    fn fetch_strains(&self, names: &std::collections::BTreeSet<String>) -> Result<BTreeMap<String, i64>, String> {
        Ok(names.iter().filter_map(|n| self.strains.get(n).map(|id| (n.clone(), *id))).collect())
    }

    fn fetch_tags(&self, names: &std::collections::BTreeSet<String>) -> Result<BTreeMap<String, i64>, String> {
        Ok(names.iter().filter_map(|n| self.tags.get(n).map(|id| (n.clone(), *id))).collect())
    }
}

/// Every flag resolves to whatever `overrides` says, defaulting to `false`
/// for anything not listed.
#[derive(Debug, Clone, Default)]
pub struct FakeFlagBackend {
    pub overrides: BTreeMap<String, bool>,
}

impl FlagBackend for FakeFlagBackend {
    fn is_enabled(&self, flag: &str, _actor_key: &str, _namespace: &str) -> Result<bool, String> {
        Ok(self.overrides.get(flag).copied().unwrap_or(false))
    }
}

/// Keyed-upsert, idempotent store matching the real gateway's contract
/// closely enough to exercise create/update/destroy and `find` round-trips
/// in tests without a database.
#[derive(Default)]
pub struct InMemoryPersistenceGateway {
    records: Mutex<BTreeMap<String, MenuItemRecord>>,
    pub fail_external_ids: Mutex<std::collections::BTreeSet<String>>,
}

impl InMemoryPersistenceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, record: MenuItemRecord) {
        self.records.lock().expect("lock poisoned").insert(record.external_id.clone(), record);
    }
}

impl PersistenceGateway for InMemoryPersistenceGateway {
    fn insert(&self, external_id: &str, changes: &Patch) -> Result<(), String> {
        if self.fail_external_ids.lock().expect("lock poisoned").contains(external_id) {
            return Err(format!("forced failure inserting {external_id}"));
        }
        let mut records = self.records.lock().expect("lock poisoned");
        records.insert(external_id.to_string(), MenuItemRecord { external_id: external_id.to_string(), fields: changes.clone() });
        Ok(())
    }

    fn update(&self, external_id: &str, changes: &Patch, _silent: bool) -> Result<(), String> {
        if self.fail_external_ids.lock().expect("lock poisoned").contains(external_id) {
            return Err(format!("forced failure updating {external_id}"));
        }
        let mut records = self.records.lock().expect("lock poisoned");
        let record = records
            .entry(external_id.to_string())
            .or_insert_with(|| MenuItemRecord { external_id: external_id.to_string(), fields: Patch::new() });
        for (k, v) in changes {
            record.fields.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn soft_delete(&self, external_id: &str, _reason: DestroyReason) -> Result<(), String> {
        let mut records = self.records.lock().expect("lock poisoned");
        if let Some(record) = records.get_mut(external_id) {
            record.fields.insert("deleted".to_string(), serde_json::json!(true));
        }
        Ok(())
    }

    fn find(&self, external_id: &str) -> Result<Option<MenuItemRecord>, String> {
        Ok(self.records.lock().expect("lock poisoned").get(external_id).cloned())
    }
}

/// Write-once key/value store standing in for the object-store sink
/// (design §6 PUT-if-absent).
#[derive(Default)]
pub struct InMemoryReplayPackSink {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryReplayPackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().expect("lock poisoned").get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReplayPackSink for InMemoryReplayPackSink {
    fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<(), SinkError> {
        let mut objects = self.objects.lock().expect("lock poisoned");
        if objects.contains_key(key) {
            return Err(SinkError(format!("object already exists at {key}")));
        }
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
