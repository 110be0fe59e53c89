//! Run progress reporting.
//!
//! A full walk over the output tree takes minutes, so `site-index` reports
//! what it is doing while it runs: how many files were discovered, then how
//! many entries went into the reports. Progress goes to **stderr** so stdout
//! keeps only the final summary.

use anyhow::{bail, Result};
use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunProgressEvent {
    /// Traversal is running; `files` dispatched so far.
    Discovering { files: u64 },
    /// Reports are being written: `n` entries out of `total`.
    Writing { n: u64, total: u64 },
}

/// Emitted every this many files or entries.
pub const REPORT_EVERY: u64 = 1000;

pub trait RunProgressReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "writing  1,234 / 5,000 entries".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Discovering { files } => {
                format!("discovering  {} files\n", format_number(*files))
            }
            RunProgressEvent::Writing { n, total } => format!(
                "writing  {} / {} entries\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Discovering { files } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "files": files
            }),
            RunProgressEvent::Writing { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "writing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
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
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value; `auto` picks [`Self::default_for_tty`].
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "auto" => Ok(Self::default_for_tty()),
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => bail!("unknown progress mode '{}' (auto, off, human, json)", other),
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
