//! Deterministic, DAG-ordered rule engine for reconciling upstream catalog
//! payloads into canonical menu-item records.
//!
//! ## How the parts work together
//!
//! A batch moves through the pipeline as:
//!
//! ```text
//! Vec<Payload> ── filter (dedupe by external_id) ──┐
//!                                                   │
//!                      BatchContext::new (now, flags, lookups frozen once)
//!                                                   │
//!                                                   v
//!                                    Processor::run, per item (pipeline.rs spawns
//!                                    these across a bounded scoped-thread pool)
//!                                      1. raw validation        (contracts.rs)
//!                                      2. external transform +
//!                                         action classification (engine/ruleset.rs,
//!                                                                 rules/classify.rs)
//!                                      3. changeset computation  (processor.rs)
//!                                      4. canonical transform    (engine/ruleset.rs,
//!                                                                 rules/canonical.rs)
//!                                      5. canonical validation   (contracts.rs)
//!                                      6. persistence             (ports.rs)
//!                                      7. observe: outcome + ReplayPack (replay.rs)
//!                                                   │
//!                                                   v
//!                                         BatchOutcome { items, counts() }
//! ```
//!
//! Rules declare `reads`/`writes`/`before`/`after`/`priority`/`flags`
//! ([`engine::RuleMeta`]); [`engine::RuleSet::compile`] turns a `Vec<Box<dyn
//! Rule>>` into a frozen, topologically ordered execution plan once per
//! ruleset version, and [`engine::RuleSet::evaluate`] runs it against an
//! immutable [`engine::ItemView`] with no hidden state between calls.
//!
//! ## Responsibilities by module
//!
//! - `engine/`: rule metadata, compilation (edges, cycle check, Kahn's
//!   algorithm), and evaluation.
//! - `model.rs`: the shared value representation threaded through every
//!   other module.
//! - `contracts.rs`: raw and canonical payload shape validation.
//! - `lookups.rs` / `flags.rs`: the two batch-scoped, read-only caches every
//!   rule consults instead of doing its own I/O.
//! - `processor.rs`: the per-item state machine.
//! - `pipeline.rs`: batch orchestration and the frozen `BatchContext`.
//! - `replay.rs`: the replay pack artifact format and deterministic replay
//!   runner.
//! - `rules/`: concrete rule implementations and the class-name registry
//!   `config.rs`'s YAML loader resolves against.
//! - `ports.rs`: the persistence gateway trait; `replay.rs` carries the
//!   matching sink trait since it's tied to the pack shape.
//! - `testutil/`: in-memory fakes for every injected port.

pub mod config;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod flags;
pub mod lookups;
pub mod model;
pub mod pipeline;
pub mod ports;
pub mod processor;
pub mod replay;
pub mod rules;
pub mod testutil;

pub use engine::{CompileOptions, ItemView, MergePolicy, Rule, RuleMeta, RuleSet};
pub use error::{BatchFatalError, CompileError, ConfigError, EvalError, RuleError};
pub use model::{Action, ChangedKeys, MenuItemRecord, Payload, Status};
pub use pipeline::{BatchConfig, BatchContext, BatchCounters, BatchOutcome, Pipeline};
pub use processor::{ItemContext, ItemOutcome, Processor};
pub use replay::{ReplayPack, ReplayPackSink, ReplayTrace};
