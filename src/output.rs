// WHY: Serialization of per-document reports and run statistics, shared by
// the CLI and integration tests

use crate::pipeline::{AnalysisReport, DocumentStats};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// One JSON line of CLI output
#[derive(Serialize)]
pub struct DocumentRecord<'a> {
    pub path: &'a str,
    #[serde(flatten)]
    pub report: &'a AnalysisReport,
}

/// Per-file processing statistics
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileStats {
    /// Input path as given or discovered
    pub path: String,
    /// Processing status (success, failed)
    pub status: String,
    /// Error message if the document could not be processed
    pub error: Option<String>,
    pub stats: Option<DocumentStats>,
}

/// Aggregate statistics for a run
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RunStats {
    pub documents_processed: u64,
    pub documents_failed: u64,
    pub total_chars: u64,
    pub total_windows: u64,
    pub failed_windows: u64,
    pub total_detections: u64,
    pub duplicates_removed: u64,
    /// Dropped detections per reason across all documents
    pub dropped: BTreeMap<String, u64>,
    pub run_time_ms: u64,
    pub files: Vec<FileStats>,
}

impl RunStats {
    pub fn record_success(&mut self, path: &str, stats: &DocumentStats) {
        self.documents_processed += 1;
        self.total_chars += stats.chars as u64;
        self.total_windows += stats.windows as u64;
        self.failed_windows += stats.failed_windows as u64;
        self.total_detections += stats.accepted as u64;
        self.duplicates_removed += stats.duplicates_removed as u64;
        for (reason, count) in &stats.dropped {
            *self.dropped.entry(reason.clone()).or_default() += *count as u64;
        }
        self.files.push(FileStats {
            path: path.to_string(),
            status: "success".to_string(),
            error: None,
            stats: Some(stats.clone()),
        });
    }

    pub fn record_failure(&mut self, path: &str, error: impl Into<String>) {
        self.documents_failed += 1;
        self.files.push(FileStats {
            path: path.to_string(),
            status: "failed".to_string(),
            error: Some(error.into()),
            stats: None,
        });
    }

    /// Write as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Append one report as a JSON line
pub async fn write_record<W: AsyncWrite + Unpin>(
    writer: &mut W,
    path: &str,
    report: &AnalysisReport,
) -> Result<()> {
    let line = serde_json::to_string(&DocumentRecord { path, report })?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}
