//! Rule & RuleMeta (design §4.1, C1).
//!
//! A [`Rule`] is metadata plus two pure functions. `applies` must be
//! deterministic over `(payload, menu_item, changed_keys, flag_snapshot,
//! lookups, now)` — everything it can see is reachable through [`ItemView`].
//! `apply` must return a patch whose keys are a subset of `meta().writes`;
//! returning an empty patch is legal and means "no change". Neither method
//! may perform I/O, mutate the view, or read a clock/RNG other than
//! `view.now()`.

use std::collections::BTreeSet;

use crate::engine::view::ItemView;
use crate::error::RuleError;
use crate::model::Patch;

/// How `RuleSet::evaluate` resolves two rules that both write the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Last rule to fire wins: `changes = changes ∪ patch` (patch overrides).
    LastWins,
    /// First rule to fire wins: `changes = patch ∪ changes` (existing overrides).
    FirstWins,
    /// Any write-write overlap without an ordering edge is a compile-time
    /// error; any overlap surviving to evaluation is a runtime error.
    ErrorOnConflict,
}

/// Declarative descriptor of a rule (design §3).
///
/// `name` must be unique within a ruleset. `writes` is the authoritative set
/// of keys the rule may emit from `apply`; `before`/`after` must reference
/// rule names that exist in the same ruleset once compiled.
#[derive(Debug, Clone)]
pub struct RuleMeta {
    pub name: String,
    pub priority: i32,
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
    pub before: BTreeSet<String>,
    pub after: BTreeSet<String>,
    pub flags: BTreeSet<String>,
}

impl RuleMeta {
    pub fn new(name: impl Into<String>) -> Self {
        RuleMeta {
            name: name.into(),
            priority: 0,
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
            before: BTreeSet::new(),
            after: BTreeSet::new(),
            flags: BTreeSet::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_reads(mut self, reads: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.reads = reads.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_writes(mut self, writes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.writes = writes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_before(mut self, before: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.before = before.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_after(mut self, after: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.after = after.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_flags(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }
}

/// A rule: metadata plus a pure `applies`/`apply` contract.
///
/// Implementations are dynamically dispatched (`Box<dyn Rule>`) because
/// rules may be constructed either in code or from a loaded YAML ruleset
/// document (design §6) — there is no closed enum of rule types.
pub trait Rule: Send + Sync {
    fn meta(&self) -> &RuleMeta;

    /// Side-effect free predicate; must not perform I/O.
    fn applies(&self, view: &ItemView<'_, '_>) -> bool;

    /// Returns a patch whose keys are a subset of `meta().writes` (P4). An
    /// `Err` here is fatal for the item — it propagates into
    /// `violations.transform` and the item terminates (design §4.1 Failure,
    /// §7 propagation).
    fn apply(&self, view: &ItemView<'_, '_>) -> Result<Patch, RuleError>;
}
