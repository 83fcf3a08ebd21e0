//! Colorized per-item report for the CLI demonstration binary, mirroring
//! the teacher's `debug_report.rs` palette.

use catalog_sync::model::Status;
use catalog_sync::pipeline::BatchOutcome;

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

fn status_color(status: Status) -> &'static str {
    match status {
        Status::Created => ansi::GREEN,
        Status::Updated => ansi::BLUE,
        Status::Noop => ansi::GRAY,
        Status::Destroyed => ansi::YELLOW,
        Status::Rejected => ansi::RED,
        Status::Queued | Status::Processing => ansi::GRAY,
    }
}

pub fn print_outcome(source_id: &str, outcome: &BatchOutcome, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Batch: \"{}\"", source_id), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Items ━━━", ansi::GRAY));
    for item in &outcome.items {
        println!(
            "  {} {} {}",
            palette.paint(format!("[{}]", item.external_id), ansi::GRAY),
            palette.bold(palette.paint(item.status.as_str(), status_color(item.status))),
            palette.dim(format!("fired: {}", item.fired_rules.join(", "))),
        );
        if !item.violations.is_empty() {
            for (field, messages) in &item.violations {
                println!("      {} {}: {}", palette.dim("✗"), palette.paint(field, ansi::RED), messages.join("; "));
            }
        }
    }

    let counts = outcome.counts();
    println!("\n{}", palette.paint("━━━ Summary ━━━", ansi::GRAY));
    println!(
        "  created: {}  │  updated: {}  │  destroyed: {}  │  noop: {}  │  rejected: {}",
        palette.paint(counts.created.to_string(), ansi::GREEN),
        palette.paint(counts.updated.to_string(), ansi::BLUE),
        palette.paint(counts.destroyed.to_string(), ansi::YELLOW),
        palette.dim(counts.noop.to_string()),
        palette.paint(counts.rejected.to_string(), ansi::RED),
    );
    println!();
}
