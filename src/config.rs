//! Ruleset configuration document (design §6, SPEC_FULL §10.3).
//!
//! Pure loader: `parse` takes YAML bytes already in hand, `into_rules`
//! resolves them into `Rule` instances via the registry in
//! `crate::rules::FACTORY_REGISTRY`. Reading the YAML text from disk, an
//! environment variable, or a config service is the caller's job (design
//! §1 scope note).

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::engine::{Rule, RuleMeta};
use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Overrides {
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    pub class: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub params: serde_yaml::Value,
    pub overrides: Option<Overrides>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesetDocument {
    pub version: String,
    pub ruleset: String,
    pub rules: Vec<RuleEntry>,
}

impl RulesetDocument {
    pub fn parse(yaml: &str) -> Result<RulesetDocument, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Resolves every enabled entry into a `Rule`, disambiguating repeated
    /// classes with a `#<n>` suffix so `RuleMeta::name` stays unique (design
    /// §3 invariant) without the document author having to name instances
    /// by hand.
    pub fn into_rules(&self) -> Result<Vec<Box<dyn Rule>>, ConfigError> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut rules = Vec::new();
        for entry in &self.rules {
            if !entry.enabled {
                continue;
            }
            let mut name = entry.class.clone();
            let mut suffix = 1;
            while !seen.insert(name.clone()) {
                suffix += 1;
                name = format!("{}#{}", entry.class, suffix);
            }

            let mut meta = RuleMeta::new(name).with_priority(entry.priority);
            if let Some(overrides) = &entry.overrides {
                meta = meta.with_before(overrides.before.clone()).with_after(overrides.after.clone());
            }

            rules.push(crate::rules::construct(&entry.class, meta, &entry.params)?);
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
version: "2025-01-01"
ruleset: "treez_create"
rules:
  - class: "BrandNameRule"
    enabled: true
    priority: 10
  - class: "StrainNameRule"
    enabled: true
    priority: 20
  - class: "TagNamesRule"
    enabled: false
    priority: 30
"#;

    #[test]
    fn parse_reads_version_and_rule_count() {
        let doc = RulesetDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.version, "2025-01-01");
        assert_eq!(doc.rules.len(), 3);
    }

    #[test]
    fn into_rules_skips_disabled_entries() {
        let doc = RulesetDocument::parse(SAMPLE).unwrap();
        let rules = doc.into_rules().unwrap();
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn into_rules_fails_on_unknown_class() {
        let doc = RulesetDocument::parse("version: \"v1\"\nruleset: \"x\"\nrules:\n  - class: \"NoSuchRule\"\n").unwrap();
        assert!(matches!(doc.into_rules(), Err(ConfigError::UnknownClass(_))));
    }

    #[test]
    fn round_trips_through_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let doc = RulesetDocument::parse(&text).unwrap();
        assert_eq!(doc.ruleset, "treez_create");
    }
}
