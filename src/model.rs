//! Shared data model (design §3): the value representation, action/status
//! enums, and the changed-keys sentinel used throughout the engine.
//!
//! Canonical field values are represented with [`serde_json::Value`] since
//! the replay pack (design §6) is itself a JSON document; reusing it avoids a
//! parallel dynamic-value type. Maps use `BTreeMap` rather than `HashMap` so
//! that iteration order — and therefore JSON serialization and any
//! `format!("{:?}")` debug output used in error messages — is deterministic,
//! which the design requires (P1, P9).

use std::collections::{BTreeMap, BTreeSet};

pub use serde_json::Value;

/// A canonical or raw field name.
pub type FieldName = String;

/// A normalized raw payload or canonical projection: `{field -> value}`.
pub type Payload = BTreeMap<FieldName, Value>;

/// A patch produced by a rule or a ruleset evaluation: `{field -> value}`.
pub type Patch = BTreeMap<FieldName, Value>;

/// `{field -> [message, ...]}`, used for both contract failures and rule
/// errors.
pub type Violations = BTreeMap<FieldName, Vec<String>>;

/// Fields changed on an item relative to the existing record.
///
/// `All` is the sentinel used for creates (design §3, §4.6 step 4); there is
/// no existing record to diff against, so every canonical field is
/// considered changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangedKeys {
    All,
    Some(BTreeSet<FieldName>),
}

impl ChangedKeys {
    pub fn empty() -> Self {
        ChangedKeys::Some(BTreeSet::new())
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            ChangedKeys::All => true,
            ChangedKeys::Some(set) => set.contains(key),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChangedKeys::All => false,
            ChangedKeys::Some(set) => set.is_empty(),
        }
    }

    /// Union with the write-set of a rule that just fired (design §4.2:
    /// "Update the running ctx: changed_keys ← changed_keys ∪ r.writes").
    pub fn union_writes(&mut self, writes: &BTreeSet<FieldName>) {
        if let ChangedKeys::Some(set) = self {
            set.extend(writes.iter().cloned());
        }
        // `All` already dominates any union.
    }

    /// Materialize as a sorted `Vec<String>` for serialization into a
    /// replay pack (`"all"` sentinel for creates, per design §6).
    pub fn to_field_list(&self) -> Vec<String> {
        match self {
            ChangedKeys::All => vec!["all".to_string()],
            ChangedKeys::Some(set) => set.iter().cloned().collect(),
        }
    }
}

/// Classification of what the pipeline should do to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Unset,
    Create,
    Update,
    Destroy,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Unset => "unset",
            Action::Create => "create",
            Action::Update => "update",
            Action::Destroy => "destroy",
        }
    }
}

/// `ItemContext.status`, as it moves through the state machine in design
/// §4.6: `queued → processing → {rejected | noop | created | updated |
/// destroyed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Queued,
    Processing,
    Rejected,
    Noop,
    Created,
    Updated,
    Destroyed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Queued | Status::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Processing => "processing",
            Status::Rejected => "rejected",
            Status::Noop => "noop",
            Status::Created => "created",
            Status::Updated => "updated",
            Status::Destroyed => "destroyed",
        }
    }
}

/// Existing catalog record an incoming payload may be reconciled against.
/// The core only needs enough of the record to diff and classify; the full
/// row shape lives with the persistence adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuItemRecord {
    pub external_id: String,
    pub fields: Payload,
}

impl MenuItemRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}
