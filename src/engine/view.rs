//! `ItemView`: the read-only window a [`crate::engine::rule::Rule`] sees
//! (design §4.1, §4.3).
//!
//! A rule never holds a `BatchContext` or `ItemContext` directly — both
//! carry fields (`fired`, `violations`, the in-progress `changes` map) that
//! only the evaluator is allowed to mutate between rule firings. `ItemView`
//! borrows just enough of each, plus the accumulated patch from whichever
//! earlier rules in this evaluation already fired, so a later rule can read
//! a value an earlier rule wrote without the evaluator copying it back into
//! `payload`.

use chrono::{DateTime, Utc};

use crate::flags::FlagSnapshot;
use crate::lookups::LookupMaps;
use crate::model::{ChangedKeys, MenuItemRecord, Patch, Payload, Value};
use crate::pipeline::BatchContext;

pub struct ItemView<'b, 'a> {
    batch: &'b BatchContext,
    payload: &'b Payload,
    menu_item: Option<&'b MenuItemRecord>,
    changed_keys: &'a ChangedKeys,
    changes_so_far: &'a Patch,
}

impl<'b, 'a> ItemView<'b, 'a> {
    pub fn new(
        batch: &'b BatchContext,
        payload: &'b Payload,
        menu_item: Option<&'b MenuItemRecord>,
        changed_keys: &'a ChangedKeys,
        changes_so_far: &'a Patch,
    ) -> Self {
        ItemView { batch, payload, menu_item, changed_keys, changes_so_far }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.batch.now
    }

    pub fn env(&self) -> &str {
        &self.batch.env
    }

    pub fn source_id(&self) -> &str {
        &self.batch.source_id
    }

    pub fn lookups(&self) -> &LookupMaps {
        &self.batch.lookups
    }

    pub fn flags(&self) -> &FlagSnapshot {
        &self.batch.flag_snapshot
    }

    /// `flag_enabled?(name)` from design §9 ("open context / singleton-method
    /// injection"). Reading an unlisted flag is a programmer error here —
    /// unknown flags are rejected at ruleset compile time (§4.5), so any
    /// name a rule asks for was already validated against the MANIFEST.
    pub fn flag_enabled(&self, name: &str) -> bool {
        self.batch.flag_snapshot.get(name).unwrap_or(false)
    }

    pub fn payload(&self) -> &Payload {
        self.payload
    }

    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn menu_item(&self) -> Option<&MenuItemRecord> {
        self.menu_item
    }

    pub fn changed_keys(&self) -> &ChangedKeys {
        self.changed_keys
    }

    pub fn has_changed(&self, key: &str) -> bool {
        self.changed_keys.contains(key)
    }

    /// Value a prior rule in this same evaluation already wrote, if any.
    pub fn pending_write(&self, key: &str) -> Option<&Value> {
        self.changes_so_far.get(key)
    }

    /// Resolution order a canonical-transform rule actually wants: a
    /// sibling rule's write this pass, falling back to the raw payload
    /// field. Existing canonical state is reached via `menu_item` directly
    /// since it predates this evaluation entirely.
    pub fn resolve(&self, key: &str) -> Option<&Value> {
        self.pending_write(key).or_else(|| self.payload_field(key))
    }
}
