//! Build progress reporting.
//!
//! Reports each committed batch during `archdex build` so users see how far
//! the run has got and how fast it is going. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use archdex_core::batch::{BatchProgress, IndexProgress, NoProgress};

/// Human-friendly progress on stderr:
/// `indexed 2,000 documents  batch 2 (1,000)  0.41 ms/doc`.
pub struct StderrProgress;

impl IndexProgress for StderrProgress {
    fn batch_written(&self, progress: &BatchProgress) {
        let line = format!(
            "indexed {} documents  batch {} ({})  {:.2} ms/doc\n",
            format_number(progress.documents),
            progress.batches,
            format_number(progress.last_batch as u64),
            progress.mean_latency().as_secs_f64() * 1000.0,
        );
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgress for JsonProgress {
    fn batch_written(&self, progress: &BatchProgress) {
        let obj = serde_json::json!({
            "event": "batch",
            "batches": progress.batches,
            "documents": progress.documents,
            "last_batch": progress.last_batch,
            "elapsed_ms": progress.elapsed.as_millis() as u64,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    pub fn reporter(&self) -> Box<dyn IndexProgress> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
