// WHY: Orchestrates chunk -> infer -> realign -> normalize for one document.
// Inference is the only suspension point; everything after it is a
// single-threaded pass over slot-ordered results

use crate::chunker::{plan_windows, ChunkingConfig, Window};
use crate::document::Document;
use crate::error::{InferenceError, PipelineError, Result};
use crate::inference::InferenceBackend;
use crate::labels::LabelConfig;
use crate::normalizer::{normalize, CanonicalDetection, NormalizeStats};
use crate::realign::{merge, realign, DroppedDetection, RawDetection};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

type WindowResult = std::result::Result<Vec<RawDetection>, InferenceError>;

/// Pipeline-wide settings, passed explicitly to [`DetectionPipeline::new`]
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    /// Maximum number of windows in flight at once
    pub max_concurrency: usize,
    /// Limit for a single window's inference call
    pub window_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            max_concurrency: num_cpus::get(),
            window_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.max_concurrency == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.window_timeout == Some(Duration::ZERO) {
            return Err(PipelineError::InvalidConfiguration(
                "window_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A window whose inference call failed or timed out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFailure {
    pub window_index: usize,
    pub window: Window,
    pub error: String,
}

/// Per-document processing statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Document length in chars
    pub chars: usize,
    pub windows: usize,
    pub failed_windows: usize,
    /// Predictions returned by the model across all windows
    pub raw_detections: usize,
    pub accepted: usize,
    pub ignored: usize,
    pub duplicates_removed: usize,
    /// Drop counts keyed by reason
    pub dropped: BTreeMap<String, usize>,
    pub inference_time_ms: u64,
    pub processing_time_ms: u64,
}

/// Everything produced for one document
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub detections: Vec<CanonicalDetection>,
    pub dropped: Vec<DroppedDetection>,
    pub failed_windows: Vec<WindowFailure>,
    pub stats: DocumentStats,
}

/// Windowed NER pipeline over an injected inference backend
pub struct DetectionPipeline {
    backend: Arc<dyn InferenceBackend>,
    labels: LabelConfig,
    config: PipelineConfig,
}

impl DetectionPipeline {
    /// Fails with `InvalidConfiguration` before any document is touched
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        labels: LabelConfig,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { backend, labels, config })
    }

    /// Detect and canonicalize entities in `text`
    ///
    /// Window and detection failures are recorded in the report; only
    /// configuration errors are returned as `Err`.
    pub async fn analyze(&self, text: &str) -> Result<AnalysisReport> {
        let start_time = Instant::now();
        let document = Document::new(text);
        let windows = plan_windows(document.len(), &self.config.chunking)?;

        let inference_start = Instant::now();
        let slots = self.infer_windows(&document, &windows).await;
        let inference_time_ms = inference_start.elapsed().as_millis() as u64;

        let mut report = AnalysisReport::default();
        let mut per_window = Vec::with_capacity(windows.len());
        let mut raw_count = 0;

        for (window_index, (window, slot)) in windows.iter().zip(slots).enumerate() {
            match slot {
                Ok(raw) => {
                    raw_count += raw.len();
                    let mut realigned = realign(window, window_index, raw, document.len());
                    for detection in realigned.detections.iter_mut().filter(|d| d.surface_text.is_empty()) {
                        detection.surface_text = document.slice(detection.start, detection.end).to_string();
                    }
                    report.dropped.extend(realigned.dropped);
                    per_window.push(realigned.detections);
                }
                Err(error) => {
                    warn!(
                        window = window_index,
                        start = window.start,
                        end = window.end,
                        backend = self.backend.name(),
                        "Window inference failed, skipping its detections: {}",
                        error
                    );
                    report.failed_windows.push(WindowFailure {
                        window_index,
                        window: *window,
                        error: error.to_string(),
                    });
                }
            }
        }

        let normalized = normalize(merge(per_window), &self.labels);
        report.detections = normalized.detections;
        report.dropped.extend(normalized.dropped);
        report.stats = build_stats(
            &document,
            &windows,
            &report,
            raw_count,
            normalized.stats,
            inference_time_ms,
        );
        report.stats.processing_time_ms = start_time.elapsed().as_millis() as u64;

        info!(
            chars = report.stats.chars,
            windows = report.stats.windows,
            failed_windows = report.stats.failed_windows,
            detections = report.stats.accepted,
            "Document analyzed in {}ms",
            report.stats.processing_time_ms
        );
        Ok(report)
    }

    /// Run inference for every window with bounded concurrency
    ///
    /// Results come back in completion order and are written to the slot of
    /// their window, so the returned vector is in window order.
    async fn infer_windows(
        &self,
        document: &Document,
        windows: &[Window],
    ) -> Vec<WindowResult> {
        let mut slots: Vec<Option<WindowResult>> = (0..windows.len()).map(|_| None).collect();

        let mut completed = stream::iter(windows.iter().enumerate())
            .map(|(index, window)| {
                let text = document.window_text(window);
                async move { (index, self.infer_one(text).await) }
            })
            .buffer_unordered(self.config.max_concurrency);

        while let Some((index, result)) = completed.next().await {
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(InferenceError::Backend("window produced no result".to_string()))
                })
            })
            .collect()
    }

    async fn infer_one(&self, text: &str) -> WindowResult {
        match self.config.window_timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.infer(text))
                .await
                .unwrap_or_else(|_| Err(InferenceError::Timeout(limit.as_millis() as u64))),
            None => self.backend.infer(text).await,
        }
    }
}

fn build_stats(
    document: &Document,
    windows: &[Window],
    report: &AnalysisReport,
    raw_detections: usize,
    normalize_stats: NormalizeStats,
    inference_time_ms: u64,
) -> DocumentStats {
    let mut dropped: BTreeMap<String, usize> = BTreeMap::new();
    for d in &report.dropped {
        *dropped.entry(d.error.kind().to_string()).or_default() += 1;
    }

    DocumentStats {
        chars: document.len(),
        windows: windows.len(),
        failed_windows: report.failed_windows.len(),
        raw_detections,
        accepted: normalize_stats.accepted,
        ignored: normalize_stats.ignored,
        duplicates_removed: normalize_stats.duplicates_removed,
        dropped,
        inference_time_ms,
        processing_time_ms: 0,
    }
}
