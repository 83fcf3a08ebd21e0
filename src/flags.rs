//! Flag Snapshot (C5, design §4.5).
//!
//! A `FlagSnapshot` is resolved exactly once per batch, against a fixed
//! MANIFEST of permitted flag names. Resolving a flag outside the MANIFEST
//! is an error, not a silent `false` — that check happens at ruleset compile
//! time (`RuleSet::compile` validates every rule's `meta.flags` against the
//! MANIFEST given to it) so that an unlisted flag access is caught before a
//! single item is processed, per design §8 boundary behavior.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// The flags this build of the ruleset knows how to ask for. Extending the
/// set of flags a deployment cares about means adding a name here and
/// re-deploying; there is no dynamic registration path.
pub const MANIFEST: &[&str] = &[
    "aggressive_brand_matching",
    "canonical_tag_dedupe",
    "enable_destroy_soft_delete",
    "strict_price_validation",
];

/// Frozen `{flag_name -> bool}` plus a stable digest over the sorted map.
/// The digest doubles as `ItemContext`/`ReplayPack` `flags_version` (design
/// §6) and as the cheap equality check for P10 (snapshot stability).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSnapshot {
    values: BTreeMap<String, bool>,
    version: String,
}

impl FlagSnapshot {
    pub fn get(&self, name: &str) -> Option<bool> {
        self.values.get(name).copied()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn values(&self) -> &BTreeMap<String, bool> {
        &self.values
    }

    fn from_values(values: BTreeMap<String, bool>) -> Self {
        let version = digest(&values);
        FlagSnapshot { values, version }
    }

    /// Rebuilds a snapshot from a replay pack's recorded `flags_snapshot`
    /// (design §4.7). The version is recomputed rather than trusted from
    /// the pack, so a tampered or corrupted pack surfaces as a version
    /// mismatch instead of replaying silently under the wrong flags.
    pub fn from_recorded(values: BTreeMap<String, bool>) -> Self {
        FlagSnapshot::from_values(values)
    }
}

/// The external collaborator a `FlagSnapshot` is resolved from. One call per
/// MANIFEST entry, keyed by an actor (typically `source_id`) and a
/// namespace; batched internally is the implementation's business, not the
/// core's.
pub trait FlagBackend: Send + Sync {
    fn is_enabled(&self, flag: &str, actor_key: &str, namespace: &str) -> Result<bool, String>;
}

/// `snapshot(actor_key, namespace)` from design §4.5.
pub fn snapshot(
    backend: &dyn FlagBackend,
    actor_key: &str,
    namespace: &str,
) -> Result<FlagSnapshot, String> {
    let mut values = BTreeMap::new();
    for &flag in MANIFEST {
        let enabled = backend.is_enabled(flag, actor_key, namespace)?;
        values.insert(flag.to_string(), enabled);
    }
    Ok(FlagSnapshot::from_values(values))
}

/// First 12 hex chars of a SHA-256 over the sorted map's canonical
/// `name=value;` serialization. `BTreeMap` iteration is already sorted, so
/// no explicit sort step is needed.
fn digest(values: &BTreeMap<String, bool>) -> String {
    let mut hasher = Sha256::new();
    for (name, enabled) in values {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(if *enabled { b"1" } else { b"0" });
        hasher.update(b";");
    }
    let full = hasher.finalize();
    hex::encode(full)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllOn;
    impl FlagBackend for AllOn {
        fn is_enabled(&self, _flag: &str, _actor_key: &str, _namespace: &str) -> Result<bool, String> {
            Ok(true)
        }
    }

    #[test]
    fn version_is_stable_for_equal_values() {
        let a = snapshot(&AllOn, "source-1", "catalog").unwrap();
        let b = snapshot(&AllOn, "source-1", "catalog").unwrap();
        assert_eq!(a.version(), b.version());
        assert_eq!(a.version().len(), 12);
    }

    #[test]
    fn unlisted_flag_returns_none() {
        let snap = snapshot(&AllOn, "source-1", "catalog").unwrap();
        assert_eq!(snap.get("not_in_manifest"), None);
    }
}
