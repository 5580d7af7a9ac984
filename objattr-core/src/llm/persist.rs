//! Append-only log of parsed corpus results.
//!
//! One record per line: `<original_text>~<json_of_attribution>\n`. Newlines inside the
//! text are written as spaces so every record stays on one line.

use crate::error::Result;
use crate::types::{ObjectAttribution, TextAttribution};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

const SEPARATOR: &str = "~";

/// Render one log record, newline included.
pub fn format_record(text: &str, attribution: &ObjectAttribution) -> Result<String> {
    let text = text.replace(['\n', '\r'], " ");
    let json = serde_json::to_string(attribution)?;
    Ok(format!("{}{}{}\n", text, SEPARATOR, json))
}

/// Parse one log record. The split is at the last `~{"objects"` so texts may contain `~`.
pub fn parse_record(line: &str) -> Option<TextAttribution> {
    let line = line.trim_end_matches(['\n', '\r']);
    let split = line.rfind("~{\"objects\"")?;
    let attribution = serde_json::from_str(&line[split + SEPARATOR.len()..]).ok()?;
    Some(TextAttribution {
        text: line[..split].to_string(),
        attribution,
    })
}

/// Read every well-formed record from `path`; malformed lines are logged and skipped.
pub fn read_log(path: &Path) -> Result<Vec<TextAttribution>> {
    let content = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(line) {
            Some(record) => records.push(record),
            None => warn!(path = %path.display(), line = lineno + 1, "Skipping malformed log record"),
        }
    }
    Ok(records)
}

/// Append-only results log shared by concurrent batch tasks.
///
/// Appends take an exclusive lock for the duration of a single record write.
#[derive(Debug)]
pub struct PersistLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PersistLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, text: &str, attribution: &ObjectAttribution) -> Result<()> {
        let record = format_record(text, attribution)?;
        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(record.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
