//! Error taxonomy.
//!
//! Mirrors the error taxonomy in the design: batch-fatal errors abort a whole
//! batch before any item is processed; item-scoped errors never escape as an
//! `Err` from [`crate::processor::Processor::run`] — they are captured into
//! `ItemContext::violations` and the item terminates with `status = rejected`.

/// Failure raised by a rule's `apply`. Rules must not catch their own
/// exceptions; this is the typed stand-in for "apply raised".
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct RuleError(pub String);

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure while compiling a [`crate::engine::RuleSet`]. Fatal at pipeline
/// construction; the pipeline refuses to accept work when this occurs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("duplicate rule name: {0}")]
    DuplicateName(String),

    #[error("rule {rule} has an ordering reference to unknown rule {target}")]
    PhantomOrderingTarget { rule: String, target: String },

    #[error("write conflict between {a} and {b} over keys {keys:?}")]
    WriteConflict { a: String, b: String, keys: Vec<String> },

    #[error("cycle detected among rules: {0:?}")]
    Cycle(Vec<String>),

    #[error("cycle during compute_order")]
    CycleDuringOrder,

    #[error("rule {rule} depends on undeclared flag {flag}")]
    UnknownFlag { rule: String, flag: String },
}

/// Write-write conflict detected at evaluation time, not compile time.
/// Only reachable under `MergePolicy::ErrorOnConflict` when the compiler's
/// data-flow synthesis was disabled for a pair the compiler did not catch
/// (e.g. overlap introduced by a dynamically loaded `params` rule).
#[derive(Debug, Clone, thiserror::Error)]
#[error("rule {rule} conflicts on keys {keys:?} already written by earlier rules")]
pub struct RuleConflict {
    pub rule: String,
    pub keys: Vec<String>,
}

/// Errors that abort an entire batch before any item is processed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchFatalError {
    #[error("ruleset compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("lookup preloader backend failed: {0}")]
    Lookup(String),

    #[error("flag backend failed: {0}")]
    Flag(String),
}

/// Failure resolving a ruleset YAML document into rule instances.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid ruleset yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown rule class: {0}")]
    UnknownClass(String),

    #[error("invalid params for rule class {class}: {message}")]
    InvalidParams { class: String, message: String },
}

/// Raised by the injected `PersistenceGateway` port.
#[derive(Debug, Clone, thiserror::Error)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);

/// Raised by the injected `ReplayPackSink` port.
#[derive(Debug, Clone, thiserror::Error)]
#[error("replay pack sink error: {0}")]
pub struct SinkError(pub String);

/// Failure surfaced from `RuleSet::evaluate` (design §4.2 evaluation step).
/// Both variants are item-scoped: the processor catches either one and
/// records it into `ItemContext::violations` (§7 propagation) rather than
/// letting it escape `Processor::run`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("rule {0} failed: {1}")]
    RuleFailed(String, RuleError),
    #[error(transparent)]
    Conflict(#[from] RuleConflict),
}

/// The five item-scoped rejection categories from the design's error
/// taxonomy, as they appear in `ItemContext::violations`. `compile_error` is
/// intentionally absent: it is batch-fatal, never per-item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    SchemaReject,
    TransformReject,
    RuleConflict,
    PersistenceError,
}

impl RejectionKind {
    pub fn violation_key(self) -> &'static str {
        match self {
            RejectionKind::SchemaReject => "schema",
            RejectionKind::TransformReject => "transform",
            RejectionKind::RuleConflict => "rule_conflict",
            RejectionKind::PersistenceError => "persistence",
        }
    }
}
