//! Ingestion progress reporting.
//!
//! Reports observable progress during `catalog ingest` so operators see how
//! far a large feed has got. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

use catalog_core::ingest::IngestProgress;

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingestion pipeline.
    fn report(&self, event: IngestProgress);
}

/// Human-friendly progress on stderr: "ingest  offers  12,000 accepted  3 skipped".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgress) {
        let line = match event {
            IngestProgress::CategoriesBuilt {
                categories,
                synthesized,
                skipped,
            } => format!(
                "ingest  categories  {} built  {} synthesized  {} skipped\n",
                format_number(categories as u64),
                format_number(synthesized as u64),
                format_number(skipped)
            ),
            IngestProgress::Offers { accepted, skipped } => format!(
                "ingest  offers  {} accepted  {} skipped\n",
                format_number(accepted),
                format_number(skipped)
            ),
            IngestProgress::Finished {
                accepted,
                skipped,
                products,
            } => format!(
                "ingest  done  {} accepted  {} skipped  {} products\n",
                format_number(accepted),
                format_number(skipped),
                format_number(products as u64)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgress) {
        if let Ok(line) = serde_json::to_string(&progress_json(event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn progress_json(event: IngestProgress) -> serde_json::Value {
    match event {
        IngestProgress::CategoriesBuilt {
            categories,
            synthesized,
            skipped,
        } => serde_json::json!({
            "event": "progress",
            "phase": "categories",
            "categories": categories,
            "synthesized": synthesized,
            "skipped": skipped
        }),
        IngestProgress::Offers { accepted, skipped } => serde_json::json!({
            "event": "progress",
            "phase": "offers",
            "accepted": accepted,
            "skipped": skipped
        }),
        IngestProgress::Finished {
            accepted,
            skipped,
            products,
        } => serde_json::json!({
            "event": "progress",
            "phase": "done",
            "accepted": accepted,
            "skipped": skipped,
            "products": products
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgress) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Parse a `--progress` value. `auto` picks by TTY.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "auto" => Some(Self::default_for_tty()),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            "off" => Some(ProgressMode::Off),
            _ => None,
        }
    }

    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller can pass it to ingest.
    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
