mod report;

use std::io::{self, IsTerminal};

use catalog_sync::config::RulesetDocument;
use catalog_sync::engine::{CompileOptions, RuleSet};
use catalog_sync::flags;
use catalog_sync::model::Payload;
use catalog_sync::pipeline::{BatchConfig, Pipeline};
use catalog_sync::rules::{CreateActionRule, DestroyActionRule, UpdateActionRule};
use catalog_sync::testutil::{FakeFlagBackend, FakeLookupBackend, InMemoryPersistenceGateway, InMemoryReplayPackSink};

fn main() {
    tracing_subscriber::fmt::init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    match run(&config) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

struct CliConfig {
    items_path: String,
    ruleset_path: String,
    source_id: String,
    color: bool,
}

fn run(config: &CliConfig) -> Result<(), String> {
    let items_text =
        std::fs::read_to_string(&config.items_path).map_err(|e| format!("failed to read {}: {e}", config.items_path))?;
    let items: Vec<Payload> =
        serde_json::from_str(&items_text).map_err(|e| format!("invalid items JSON: {e}"))?;

    let ruleset_text = std::fs::read_to_string(&config.ruleset_path)
        .map_err(|e| format!("failed to read {}: {e}", config.ruleset_path))?;
    let document = RulesetDocument::parse(&ruleset_text).map_err(|e| e.to_string())?;

    let known_flags = flags::MANIFEST.iter().map(|s| s.to_string()).collect();

    let external_transformer = RuleSet::compile(
        vec![
            Box::new(CreateActionRule::new(catalog_sync::engine::RuleMeta::new("create_action_rule"))),
            Box::new(UpdateActionRule::new(catalog_sync::engine::RuleMeta::new("update_action_rule"))),
            Box::new(DestroyActionRule::new(catalog_sync::engine::RuleMeta::new("destroy_action_rule"))),
        ],
        document.version.clone(),
        &known_flags,
        CompileOptions::default(),
    )
    .map_err(|e| e.to_string())?;

    let create_tx = RuleSet::compile(document.into_rules().map_err(|e| e.to_string())?, document.version.clone(), &known_flags, CompileOptions::default())
        .map_err(|e| e.to_string())?;
    let update_tx = RuleSet::compile(document.into_rules().map_err(|e| e.to_string())?, document.version.clone(), &known_flags, CompileOptions::default())
        .map_err(|e| e.to_string())?;

    let pipeline = Pipeline::new(
        BatchConfig::default(),
        Box::new(catalog_sync::contracts::treez_raw_payload_contract()),
        Box::new(catalog_sync::contracts::canonical_menu_item_contract()),
        external_transformer,
        create_tx,
        update_tx,
        Box::new(FakeLookupBackend::default()),
        Box::new(FakeFlagBackend::default()),
        Box::new(InMemoryPersistenceGateway::new()),
        Box::new(InMemoryReplayPackSink::new()),
    );

    let outcome = pipeline.call(items, &config.source_id).map_err(|e| e.to_string())?;
    report::print_outcome(&config.source_id, &outcome, config.color);
    Ok(())
}

fn parse_args() -> Result<CliConfig, String> {
    let mut items_path: Option<String> = None;
    let mut ruleset_path: Option<String> = None;
    let mut source_id = "demo".to_string();
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("catalog-sync {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--items" => {
                items_path = Some(args.next().ok_or_else(|| "error: --items expects a value".to_string())?);
            }
            "--ruleset" => {
                ruleset_path = Some(args.next().ok_or_else(|| "error: --ruleset expects a value".to_string())?);
            }
            "--source" => {
                source_id = args.next().ok_or_else(|| "error: --source expects a value".to_string())?;
            }
            _ => return Err(format!("error: unknown option '{arg}'")),
        }
    }

    let items_path = items_path.ok_or_else(|| format!("error: --items is required\n\n{}", help_text()))?;
    let ruleset_path = ruleset_path.ok_or_else(|| format!("error: --ruleset is required\n\n{}", help_text()))?;

    Ok(CliConfig { items_path, ruleset_path, source_id, color })
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "catalog-sync {version}

Deterministic catalog-ingestion rule engine CLI (demonstration harness).

Usage:
  catalog-sync --items <payloads.json> --ruleset <ruleset.yaml> [OPTIONS]

Options:
  --items <path>      JSON array of raw upstream payloads.
  --ruleset <path>    YAML ruleset document (design §6 shape).
  --source <id>       Source id for this batch. Default: demo
  --color             Force ANSI color output.
  --no-color          Disable ANSI color output.
  -h, --help          Show this help message.
  -V, --version       Print version information.

Exit codes:
  0  Success.
  1  Internal error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION")
    )
}
