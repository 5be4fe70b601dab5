//! Request accounting.
//!
//! One JSON line per completed request, appended to a configurable sink.
//! Appends are dispatched off the request path and their failures are
//! absorbed; a broken log never breaks a response.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The logged outcome of one completed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingRecord {
    pub request_id: String,

    /// Unix seconds (UTC); injected at append time when absent.
    #[serde(default)]
    pub timestamp: Option<u64>,

    pub model: String,
    pub prompt_length: usize,
    pub complexity_score: u32,
    pub reasons: Vec<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: f64,
    pub cost_usd: f64,
    pub http_status: u16,
}

/// Append-only JSON-lines sink for accounting records.
#[derive(Debug, Clone)]
pub struct AccountingLog {
    path: PathBuf,
}

impl AccountingLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line and flush.
    ///
    /// The file is opened in append mode on every call, so each record is
    /// one atomic line append; concurrent multi-process writers are not
    /// otherwise coordinated.
    pub fn append(&self, mut record: AccountingRecord) -> std::io::Result<()> {
        if record.timestamp.is_none() {
            record.timestamp = Some(unix_now());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(&record)?;
        writeln!(file, "{}", line)?;
        file.flush()
    }

    /// Fire-and-forget append: the caller does not wait for the write, and
    /// write failures are reported but never propagate.
    pub fn dispatch(&self, record: AccountingRecord) {
        let log = self.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = log.append(record) {
                tracing::error!(
                    error = %e,
                    path = %log.path.display(),
                    "failed to append accounting record"
                );
            }
        });
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
