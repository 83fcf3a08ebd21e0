//! End-to-end scenarios S1-S6 (design §8), exercised against the real
//! `Pipeline` wired up with the in-memory fakes from `testutil`.

use std::collections::BTreeSet;

use serde_json::json;

use catalog_sync::contracts::{canonical_menu_item_contract, treez_raw_payload_contract};
use catalog_sync::engine::{CompileOptions, MergePolicy, RuleMeta, RuleSet};
use catalog_sync::model::{MenuItemRecord, Payload, Status};
use catalog_sync::pipeline::{BatchConfig, Pipeline};
use catalog_sync::rules::{BrandNameRule, CreateActionRule, DestroyActionRule, TagNamesRule, UpdateActionRule};
use catalog_sync::testutil::{FakeFlagBackend, FakeLookupBackend, InMemoryPersistenceGateway, InMemoryReplayPackSink};

fn no_flags() -> BTreeSet<String> {
    BTreeSet::new()
}

fn classification_ruleset() -> RuleSet {
    RuleSet::compile(
        vec![
            Box::new(CreateActionRule::new(RuleMeta::new("create_action_rule"))),
            Box::new(UpdateActionRule::new(RuleMeta::new("update_action_rule"))),
            Box::new(DestroyActionRule::new(RuleMeta::new("destroy_action_rule"))),
        ],
        "v1",
        &no_flags(),
        CompileOptions::default(),
    )
    .unwrap()
}

fn canonical_ruleset() -> RuleSet {
    RuleSet::compile(
        vec![
            Box::new(BrandNameRule::new(RuleMeta::new("brand_name_rule"))),
            Box::new(TagNamesRule::new(RuleMeta::new("tag_names_rule"))),
        ],
        "v1",
        &no_flags(),
        CompileOptions::default(),
    )
    .unwrap()
}

fn build_pipeline(lookups: FakeLookupBackend, persistence: InMemoryPersistenceGateway) -> Pipeline {
    Pipeline::new(
        BatchConfig::default(),
        Box::new(treez_raw_payload_contract()),
        Box::new(canonical_menu_item_contract()),
        classification_ruleset(),
        canonical_ruleset(),
        canonical_ruleset(),
        Box::new(lookups),
        Box::new(FakeFlagBackend::default()),
        Box::new(persistence),
        Box::new(InMemoryReplayPackSink::new()),
    )
}

#[test]
fn s1_create_path_brand_resolved() {
    let lookups = FakeLookupBackend { brands: [("Acme".to_string(), 42)].into_iter().collect(), ..Default::default() };
    let pipeline = build_pipeline(lookups, InMemoryPersistenceGateway::new());

    let payload = Payload::from_iter([
        ("external_id".to_string(), json!("X1")),
        ("name".to_string(), json!("Blue Dream")),
        ("brand".to_string(), json!("Acme")),
        ("status".to_string(), json!("active")),
    ]);

    let outcome = pipeline.call(vec![payload], "treez").unwrap();
    assert_eq!(outcome.items.len(), 1);
    let item = &outcome.items[0];
    assert_eq!(item.external_id, "X1");
    assert_eq!(item.status, Status::Created);
    assert!(item.fired_rules.contains(&"brand_name_rule".to_string()));
    assert!(item.fired_rules.contains(&"create_action_rule".to_string()));
    assert_eq!(item.replay_pack.changes.get("brand_id"), Some(&json!(42)));
}

#[test]
fn s2_update_path_unresolved_brand_dropped() {
    let persistence = InMemoryPersistenceGateway::new();
    persistence.seed(MenuItemRecord {
        external_id: "X2".to_string(),
        fields: Payload::from_iter([
            ("external_id".to_string(), json!("X2")),
            ("name".to_string(), json!("OG Kush")),
            ("brand_id".to_string(), json!(7)),
            ("status".to_string(), json!("active")),
        ]),
    });
    let pipeline = build_pipeline(FakeLookupBackend::default(), persistence);

    let payload = Payload::from_iter([
        ("external_id".to_string(), json!("X2")),
        ("name".to_string(), json!("OG Kush")),
        ("brand".to_string(), json!("Unknown")),
        ("status".to_string(), json!("active")),
    ]);

    let outcome = pipeline.call(vec![payload], "treez").unwrap();
    let item = &outcome.items[0];
    assert!(matches!(item.status, Status::Updated | Status::Noop));
    assert!(item.violations.is_empty());
    assert!(!item.replay_pack.changes.contains_key("brand_id"));
}

#[test]
fn s3_destroy_classification() {
    let persistence = InMemoryPersistenceGateway::new();
    persistence.seed(MenuItemRecord {
        external_id: "X3".to_string(),
        fields: Payload::from_iter([
            ("external_id".to_string(), json!("X3")),
            ("name".to_string(), json!("Sour Diesel")),
            ("status".to_string(), json!("active")),
        ]),
    });
    let pipeline = build_pipeline(FakeLookupBackend::default(), persistence);

    let payload = Payload::from_iter([
        ("external_id".to_string(), json!("X3")),
        ("deleted_at".to_string(), json!("2025-01-01")),
    ]);

    let outcome = pipeline.call(vec![payload], "treez").unwrap();
    let item = &outcome.items[0];
    assert_eq!(item.status, Status::Destroyed);
    assert_eq!(item.fired_rules, vec!["destroy_action_rule".to_string()]);
}

#[test]
fn s4_raw_validation_failure() {
    let pipeline = build_pipeline(FakeLookupBackend::default(), InMemoryPersistenceGateway::new());
    let payload = Payload::from_iter([("external_id".to_string(), json!("X4"))]);

    let outcome = pipeline.call(vec![payload], "treez").unwrap();
    let item = &outcome.items[0];
    assert_eq!(item.status, Status::Rejected);
    assert_eq!(item.violations.get("name"), Some(&vec!["must be filled".to_string()]));
    assert_eq!(item.fired_rules, vec!["raw_validation".to_string()]);
}

#[test]
fn s5_compile_time_conflict_is_rejected() {
    struct WritesTags(RuleMeta);
    impl catalog_sync::engine::Rule for WritesTags {
        fn meta(&self) -> &RuleMeta {
            &self.0
        }
        fn applies(&self, _view: &catalog_sync::engine::ItemView<'_, '_>) -> bool {
            true
        }
        fn apply(&self, _view: &catalog_sync::engine::ItemView<'_, '_>) -> Result<catalog_sync::model::Patch, catalog_sync::error::RuleError> {
            Ok(catalog_sync::model::Patch::new())
        }
    }

    let rule_a = WritesTags(RuleMeta::new("rule_a").with_writes(["tags"]));
    let rule_b = WritesTags(RuleMeta::new("rule_b").with_writes(["tags"]));

    let result = RuleSet::compile(
        vec![Box::new(rule_a), Box::new(rule_b)],
        "v1",
        &no_flags(),
        CompileOptions { synthesize_data_flow_edges: false, merge_policy: MergePolicy::ErrorOnConflict },
    );

    match result {
        Err(catalog_sync::error::CompileError::WriteConflict { a, b, keys }) => {
            assert_eq!((a.as_str(), b.as_str()), ("rule_a", "rule_b"));
            assert_eq!(keys, vec!["tags".to_string()]);
        }
        other => panic!("expected WriteConflict, got {other:?}"),
    }
}

#[test]
fn s6_determinism_under_permutation() {
    let lookups = FakeLookupBackend { brands: [("Acme".to_string(), 42)].into_iter().collect(), ..Default::default() };
    let items = vec![
        Payload::from_iter([
            ("external_id".to_string(), json!("A")),
            ("name".to_string(), json!("Item A")),
            ("brand".to_string(), json!("Acme")),
            ("status".to_string(), json!("active")),
        ]),
        Payload::from_iter([
            ("external_id".to_string(), json!("B")),
            ("name".to_string(), json!("Item B")),
            ("status".to_string(), json!("active")),
        ]),
        Payload::from_iter([("external_id".to_string(), json!("C"))]),
    ];

    let forward = build_pipeline(lookups.clone(), InMemoryPersistenceGateway::new()).call(items.clone(), "treez").unwrap();

    let mut reversed_items = items;
    reversed_items.reverse();
    let reversed = build_pipeline(lookups, InMemoryPersistenceGateway::new()).call(reversed_items, "treez").unwrap();

    let mut forward_by_id: Vec<_> = forward.items.iter().map(|i| (i.external_id.clone(), i.status)).collect();
    let mut reversed_by_id: Vec<_> = reversed.items.iter().map(|i| (i.external_id.clone(), i.status)).collect();
    forward_by_id.sort();
    reversed_by_id.sort();
    assert_eq!(forward_by_id, reversed_by_id);

    assert_eq!(forward.items[0].external_id, "A");
    assert_eq!(reversed.items[0].external_id, "C");
}
