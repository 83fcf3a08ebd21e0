//! Edge-set construction, cycle detection, and the deterministic topological
//! sort behind `RuleSet::compile` (design §4.2, steps 1/3/4).
//!
//! Grounded on the Kahn's-algorithm-with-reverse-adjacency shape used for
//! level computation elsewhere in the pack: an in-degree table plus a
//! reverse-dependency map avoids rescanning the whole edge list on every
//! extraction. The one addition this domain needs is the tie-breaker: ready
//! nodes are popped in `(priority, name)` order rather than insertion order,
//! so two independently-compiled `RuleSet`s over the same rules always agree
//! on an ordering (P1, P2).

use std::collections::{BTreeMap, BTreeSet};

use crate::error::CompileError;

/// Directed edge `from -> to`, meaning `from` must run before `to`.
pub type Edge = (String, String);

pub struct Graph {
    nodes: BTreeSet<String>,
    edges: BTreeSet<Edge>,
}

impl Graph {
    pub fn new(nodes: BTreeSet<String>, edges: BTreeSet<Edge>) -> Self {
        Graph { nodes, edges }
    }

    pub fn edges(&self) -> &BTreeSet<Edge> {
        &self.edges
    }

    /// Strongly connected components via Tarjan's algorithm. A component of
    /// size > 1 is a cycle (design §4.2 step 3); a self-loop (`a -> a`) is
    /// also a cycle of size 1 and is checked separately.
    pub fn strongly_connected_components(&self) -> Vec<Vec<String>> {
        let mut adj: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for node in &self.nodes {
            adj.entry(node.as_str()).or_default();
        }
        for (from, to) in &self.edges {
            adj.entry(from.as_str()).or_default().push(to.as_str());
        }

        let mut index_counter = 0usize;
        let mut stack: Vec<&str> = Vec::new();
        let mut on_stack: BTreeSet<&str> = BTreeSet::new();
        let mut indices: BTreeMap<&str, usize> = BTreeMap::new();
        let mut lowlink: BTreeMap<&str, usize> = BTreeMap::new();
        let mut sccs: Vec<Vec<String>> = Vec::new();

        for node in &self.nodes {
            if !indices.contains_key(node.as_str()) {
                strong_connect(
                    node.as_str(),
                    &adj,
                    &mut index_counter,
                    &mut stack,
                    &mut on_stack,
                    &mut indices,
                    &mut lowlink,
                    &mut sccs,
                );
            }
        }
        sccs
    }

    /// Kahn's algorithm with a `(priority, name)` ready-queue tie-breaker
    /// (design §4.2 step 4). `priority` looks up each node's declared
    /// priority; ties within equal priority fall back to lexicographic name
    /// order, making the result independent of input order (P1, P2).
    pub fn topological_order(&self, priority: &BTreeMap<String, i32>) -> Result<Vec<String>, CompileError> {
        let mut in_degree: BTreeMap<&str, usize> = self.nodes.iter().map(|n| (n.as_str(), 0)).collect();
        let mut forward: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (from, to) in &self.edges {
            forward.entry(from.as_str()).or_default().push(to.as_str());
            *in_degree.entry(to.as_str()).or_insert(0) += 1;
        }

        let mut ready: BTreeSet<(i32, String)> = self
            .nodes
            .iter()
            .filter(|n| in_degree.get(n.as_str()).copied().unwrap_or(0) == 0)
            .map(|n| (priority.get(n).copied().unwrap_or(0), n.clone()))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some((p, name)) = ready.iter().next().cloned() {
            ready.remove(&(p, name.clone()));
            order.push(name.clone());
            if let Some(dependents) = forward.get(name.as_str()) {
                for &dep in dependents {
                    let degree = in_degree.get_mut(dep).expect("dependent must be a known node");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert((priority.get(dep).copied().unwrap_or(0), dep.to_string()));
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(CompileError::CycleDuringOrder);
        }
        Ok(order)
    }
}

#[allow(clippy::too_many_arguments)]
fn strong_connect<'a>(
    v: &'a str,
    adj: &BTreeMap<&'a str, Vec<&'a str>>,
    index_counter: &mut usize,
    stack: &mut Vec<&'a str>,
    on_stack: &mut BTreeSet<&'a str>,
    indices: &mut BTreeMap<&'a str, usize>,
    lowlink: &mut BTreeMap<&'a str, usize>,
    sccs: &mut Vec<Vec<String>>,
) {
    indices.insert(v, *index_counter);
    lowlink.insert(v, *index_counter);
    *index_counter += 1;
    stack.push(v);
    on_stack.insert(v);

    if let Some(successors) = adj.get(v) {
        for &w in successors {
            if !indices.contains_key(w) {
                strong_connect(w, adj, index_counter, stack, on_stack, indices, lowlink, sccs);
                let w_low = lowlink[w];
                let v_low = lowlink[v];
                lowlink.insert(v, v_low.min(w_low));
            } else if on_stack.contains(w) {
                let w_idx = indices[w];
                let v_low = lowlink[v];
                lowlink.insert(v, v_low.min(w_idx));
            }
        }
    }

    if lowlink[v] == indices[v] {
        let mut component = Vec::new();
        loop {
            let w = stack.pop().expect("component must unwind to v");
            on_stack.remove(w);
            component.push(w.to_string());
            if w == v {
                break;
            }
        }
        sccs.push(component);
    }
}
