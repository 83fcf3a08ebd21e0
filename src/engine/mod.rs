//! The rule engine: declarative rules compiled into a deterministic,
//! DAG-ordered execution plan (C1/C2).
//!
//! ```text
//!   Vec<Box<dyn Rule>>
//!          |
//!          v  RuleSet::compile  (edges, write-conflict check, SCC, Kahn)
//!   +----------------+
//!   |    RuleSet     |  frozen: order, rules_by_name, edges, version
//!   +----------------+
//!          |
//!          v  RuleSet::evaluate(&mut changed_keys, |changes, ck| ItemView::new(...))
//!   (changes: Patch, fired: Vec<String>) — changed_keys updated in place
//! ```
//!
//! `compile` is the only place a `RuleSet` can go wrong; `evaluate` is
//! infallible except for a rule's own `apply` failing or an
//! `error_on_conflict` write collision surviving compilation (possible only
//! when data-flow edge synthesis was off for a pair the compiler therefore
//! never saw as connected).

#[path = "graph.rs"]
mod graph;
#[path = "rule.rs"]
mod rule;
#[path = "ruleset.rs"]
mod ruleset;
#[path = "view.rs"]
pub mod view;

pub use graph::{Edge, Graph};
pub use rule::{MergePolicy, Rule, RuleMeta};
pub use ruleset::{CompileOptions, RuleSet};
pub use view::ItemView;
