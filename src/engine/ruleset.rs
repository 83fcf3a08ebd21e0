//! RuleSet Compiler & evaluator (C2, design §4.2).

use std::collections::{BTreeMap, BTreeSet};

use crate::engine::graph::{Edge, Graph};
use crate::engine::rule::{MergePolicy, Rule};
use crate::engine::view::ItemView;
use crate::error::{CompileError, EvalError, RuleConflict};
use crate::model::{ChangedKeys, Patch};

/// Whether `compile` additionally synthesizes `a -> b` edges for
/// `a.writes ∩ b.reads ≠ ∅` pairs (design §4.2 step 1). Enabling it relaxes
/// the write-conflict check to last-writer-wins for pairs it connects,
/// since a synthesized edge counts as an ordering edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub synthesize_data_flow_edges: bool,
    pub merge_policy: MergePolicy,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { synthesize_data_flow_edges: false, merge_policy: MergePolicy::ErrorOnConflict }
    }
}

/// Frozen, topologically ordered bundle of rules (design §3).
pub struct RuleSet {
    version: String,
    order: Vec<String>,
    rules_by_name: BTreeMap<String, Box<dyn Rule>>,
    edges: BTreeSet<Edge>,
    merge_policy: MergePolicy,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("version", &self.version)
            .field("order", &self.order)
            .field("edges", &self.edges)
            .field("merge_policy", &self.merge_policy)
            .finish_non_exhaustive()
    }
}

impl RuleSet {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn rule(&self, name: &str) -> Option<&dyn Rule> {
        self.rules_by_name.get(name).map(|b| b.as_ref())
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    /// Compile rules into a frozen execution plan (design §4.2 steps 1-5).
    /// `known_flags` is the MANIFEST every rule's `meta.flags` is validated
    /// against; an unlisted flag fails compilation rather than silently
    /// resolving to `false` at run time (design §8 boundary behavior).
    pub fn compile(
        rules: Vec<Box<dyn Rule>>,
        version: impl Into<String>,
        known_flags: &BTreeSet<String>,
        options: CompileOptions,
    ) -> Result<RuleSet, CompileError> {
        let mut rules_by_name: BTreeMap<String, Box<dyn Rule>> = BTreeMap::new();
        let mut names: BTreeSet<String> = BTreeSet::new();
        for rule in rules {
            let name = rule.meta().name.clone();
            if !names.insert(name.clone()) {
                return Err(CompileError::DuplicateName(name));
            }
            rules_by_name.insert(name, rule);
        }

        for rule in rules_by_name.values() {
            let meta = rule.meta();
            for target in meta.before.iter().chain(meta.after.iter()) {
                if !names.contains(target) {
                    return Err(CompileError::PhantomOrderingTarget {
                        rule: meta.name.clone(),
                        target: target.clone(),
                    });
                }
            }
            for flag in &meta.flags {
                if !known_flags.contains(flag) {
                    return Err(CompileError::UnknownFlag { rule: meta.name.clone(), flag: flag.clone() });
                }
            }
        }

        let mut edges: BTreeSet<Edge> = BTreeSet::new();
        for rule in rules_by_name.values() {
            let meta = rule.meta();
            for target in &meta.before {
                edges.insert((meta.name.clone(), target.clone()));
            }
            for dep in &meta.after {
                edges.insert((dep.clone(), meta.name.clone()));
            }
        }
        if options.synthesize_data_flow_edges {
            for a in rules_by_name.values() {
                for b in rules_by_name.values() {
                    if a.meta().name == b.meta().name {
                        continue;
                    }
                    if !a.meta().writes.is_disjoint(&b.meta().reads) {
                        edges.insert((a.meta().name.clone(), b.meta().name.clone()));
                    }
                }
            }
        }

        let ordered_set: BTreeSet<Edge> = edges.clone();
        let has_edge = |a: &str, b: &str| -> bool {
            ordered_set.contains(&(a.to_string(), b.to_string())) || ordered_set.contains(&(b.to_string(), a.to_string()))
        };

        if matches!(options.merge_policy, MergePolicy::ErrorOnConflict) {
            let names_vec: Vec<&str> = names.iter().map(String::as_str).collect();
            for i in 0..names_vec.len() {
                for j in (i + 1)..names_vec.len() {
                    let a = &rules_by_name[names_vec[i]];
                    let b = &rules_by_name[names_vec[j]];
                    let overlap: Vec<String> =
                        a.meta().writes.intersection(&b.meta().writes).cloned().collect();
                    if !overlap.is_empty() && !has_edge(names_vec[i], names_vec[j]) {
                        return Err(CompileError::WriteConflict {
                            a: names_vec[i].to_string(),
                            b: names_vec[j].to_string(),
                            keys: overlap,
                        });
                    }
                }
            }
        }

        let graph = Graph::new(names.clone(), edges.clone());
        let sccs = graph.strongly_connected_components();
        let cyclic: Vec<String> = sccs.into_iter().filter(|c| c.len() > 1).flatten().collect();
        if !cyclic.is_empty() {
            return Err(CompileError::Cycle(cyclic));
        }

        let priority: BTreeMap<String, i32> =
            rules_by_name.iter().map(|(name, rule)| (name.clone(), rule.meta().priority)).collect();
        let order = graph.topological_order(&priority)?;

        Ok(RuleSet { version: version.into(), order, rules_by_name, edges, merge_policy: options.merge_policy })
    }

    /// `evaluate(changed_keys, ctx) -> (changes, fired)` (design §4.2).
    /// `changed_keys` is updated in place after each fired rule —
    /// `changed_keys ← changed_keys ∪ r.writes` — so a later rule in this
    /// same ruleset observes an earlier sibling's writes via
    /// `ItemView::has_changed` without waiting for the whole ruleset to
    /// finish.
    pub fn evaluate<'b>(
        &self,
        changed_keys: &mut ChangedKeys,
        view_of: impl for<'a> Fn(&'a Patch, &'a ChangedKeys) -> ItemView<'b, 'a>,
    ) -> Result<(Patch, Vec<String>), EvalError> {
        let mut changes: Patch = Patch::new();
        let mut fired: Vec<String> = Vec::new();

        for name in &self.order {
            let rule = self.rules_by_name.get(name).expect("ordered name must exist in rules_by_name");
            let view = view_of(&changes, changed_keys);
            if !rule.applies(&view) {
                continue;
            }
            let patch = rule
                .apply(&view)
                .map_err(|e| EvalError::RuleFailed(name.clone(), e))?;

            let overlap: Vec<String> = patch.keys().filter(|k| changes.contains_key(*k)).cloned().collect();
            if !overlap.is_empty() && matches!(self.merge_policy, MergePolicy::ErrorOnConflict) {
                return Err(EvalError::Conflict(RuleConflict { rule: name.clone(), keys: overlap }));
            }

            match self.merge_policy {
                MergePolicy::LastWins | MergePolicy::ErrorOnConflict => {
                    changes.extend(patch);
                }
                MergePolicy::FirstWins => {
                    for (k, v) in patch {
                        changes.entry(k).or_insert(v);
                    }
                }
            }
            changed_keys.union_writes(&rule.meta().writes);
            fired.push(name.clone());
        }

        Ok((changes, fired))
    }

    pub fn edges(&self) -> &BTreeSet<Edge> {
        &self.edges
    }
}
