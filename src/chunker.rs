use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Overlap used by the reference token-classification setup
pub const DEFAULT_OVERLAP_LENGTH: usize = 40;

/// A `[start, end)` char range of the document processed by one model call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position < self.end
    }
}

/// Configuration for splitting long documents into model-sized windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chars per window
    pub window_length: usize,
    /// Chars shared by consecutive windows
    pub overlap_length: usize,
    /// Documents at or below this length are sent as one window
    pub threshold: usize,
}

impl ChunkingConfig {
    /// Window and threshold of twice the model's max input length
    pub fn for_model_max_length(model_max_length: usize) -> Self {
        Self {
            window_length: model_max_length * 2,
            overlap_length: DEFAULT_OVERLAP_LENGTH,
            threshold: model_max_length * 2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_window_params(self.window_length, self.overlap_length)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::for_model_max_length(512)
    }
}

fn validate_window_params(window_length: usize, overlap_length: usize) -> Result<()> {
    if window_length == 0 {
        return Err(PipelineError::InvalidConfiguration(
            "window_length must be greater than zero".to_string(),
        ));
    }
    if overlap_length >= window_length {
        return Err(PipelineError::InvalidConfiguration(format!(
            "overlap_length ({overlap_length}) must be smaller than window_length ({window_length})"
        )));
    }
    Ok(())
}

/// Compute overlapping windows covering `[0, total_length)`
///
/// Windows advance by `window_length - overlap_length` and the sequence ends
/// with the first window that reaches `total_length`, so the last window may
/// be shorter than the others. An empty document has no windows.
pub fn compute_windows(
    total_length: usize,
    window_length: usize,
    overlap_length: usize,
) -> Result<Vec<Window>> {
    validate_window_params(window_length, overlap_length)?;

    let step = window_length - overlap_length;
    let mut windows = Vec::with_capacity(total_length.div_ceil(step));
    let mut start = 0;

    while start < total_length {
        let end = (start + window_length).min(total_length);
        windows.push(Window { start, end });
        if end == total_length {
            break;
        }
        start += step;
    }

    debug!(
        total_length,
        window_length,
        overlap_length,
        windows = windows.len(),
        "Computed windows"
    );
    Ok(windows)
}

/// Apply the chunking policy: one window below the threshold, overlapping
/// windows above it
///
/// A threshold larger than `window_length` is capped to it, so no window
/// is ever longer than `window_length`.
pub fn plan_windows(total_length: usize, config: &ChunkingConfig) -> Result<Vec<Window>> {
    config.validate()?;

    if total_length == 0 {
        return Ok(Vec::new());
    }
    if total_length <= config.threshold.min(config.window_length) {
        return Ok(vec![Window { start: 0, end: total_length }]);
    }

    debug!(
        "Splitting text into windows, length {} > threshold {}",
        total_length, config.threshold
    );
    compute_windows(total_length, config.window_length, config.overlap_length)
}
