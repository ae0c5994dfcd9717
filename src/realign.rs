// WHY: Maps window-local predictions into document coordinates and merges
// all windows into the single ordered stream the normalizer relies on

use crate::chunker::Window;
use crate::error::DetectionError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Prediction as emitted by the model for one window, offsets window-local
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f64,
    pub surface_text: String,
}

/// Prediction expressed in document-global char offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDetection {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f64,
    pub surface_text: String,
    /// Index of the window that produced this prediction
    pub window_index: usize,
}

impl GlobalDetection {
    pub fn span_len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// A detection removed from the stream, with enough context for postmortems
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedDetection {
    pub window_index: usize,
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub error: DetectionError,
}

/// Output of realigning one window
#[derive(Debug, Default)]
pub struct Realigned {
    pub detections: Vec<GlobalDetection>,
    pub dropped: Vec<DroppedDetection>,
}

/// Shift a window's raw predictions into document coordinates
///
/// Spans that end past `document_len` or that are empty are dropped with a
/// warning; the rest of the window is unaffected.
pub fn realign(
    window: &Window,
    window_index: usize,
    raw_detections: Vec<RawDetection>,
    document_len: usize,
) -> Realigned {
    let mut out = Realigned {
        detections: Vec::with_capacity(raw_detections.len()),
        dropped: Vec::new(),
    };

    for raw in raw_detections {
        // Offsets come from the model; an overflowing sum is out of range, not a panic
        let start = window.start.saturating_add(raw.start);
        let end = window.start.saturating_add(raw.end);
        let overflowed = window.start.checked_add(raw.end).is_none();

        let error = if raw.start >= raw.end {
            Some(DetectionError::MalformedDetection {
                message: format!("empty or inverted span [{},{})", raw.start, raw.end),
            })
        } else if overflowed || end > document_len {
            Some(DetectionError::OffsetOutOfRange { start, end, document_len })
        } else {
            None
        };

        if let Some(error) = error {
            warn!(
                window = window_index,
                label = %raw.label,
                start,
                end,
                "Dropping detection: {}",
                error
            );
            out.dropped.push(DroppedDetection {
                window_index,
                label: raw.label,
                start,
                end,
                error,
            });
            continue;
        }

        out.detections.push(GlobalDetection {
            start,
            end,
            label: raw.label,
            score: raw.score,
            surface_text: raw.surface_text,
            window_index,
        });
    }

    out
}

/// Concatenate per-window results in window order, then order by start
/// ascending with longer spans first on ties
///
/// The sort is stable, so identical spans keep window order.
pub fn merge(per_window: Vec<Vec<GlobalDetection>>) -> Vec<GlobalDetection> {
    let mut merged: Vec<GlobalDetection> = per_window.into_iter().flatten().collect();
    sort_detections(&mut merged);
    merged
}

/// Position order used throughout the pipeline
pub fn sort_detections(detections: &mut [GlobalDetection]) {
    detections.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.span_len().cmp(&a.span_len()))
    });
}
