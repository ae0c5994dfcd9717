// WHY: Canonicalization and dedup are the contract downstream consumers rely
// on: every output type is supported and no two outputs share a span

use crate::error::DetectionError;
use crate::labels::{LabelConfig, UNSUPPORTED};
use crate::realign::{DroppedDetection, GlobalDetection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Name reported as the source of every explanation
pub const RECOGNIZER_NAME: &str = "TransformersRecognizer";

/// Why a detection was reported, kept for traceability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub recognizer: String,
    /// Model score rounded to two decimals
    pub original_score: f64,
    pub textual_explanation: String,
    /// Surface text that triggered the detection
    pub pattern: String,
}

/// Final, immutable detection handed to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDetection {
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
    pub explanation: Explanation,
}

impl CanonicalDetection {
    pub fn surface_text(&self) -> &str {
        &self.explanation.pattern
    }

    /// Re-express as a pipeline detection, e.g. to normalize again
    pub fn to_global(&self, window_index: usize) -> GlobalDetection {
        GlobalDetection {
            start: self.start,
            end: self.end,
            label: self.entity_type.clone(),
            score: self.score,
            surface_text: self.explanation.pattern.clone(),
            window_index,
        }
    }
}

/// Counters describing what the normalizer did with its input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub input: usize,
    pub accepted: usize,
    pub ignored: usize,
    pub duplicates_removed: usize,
    /// Drop counts keyed by [`DetectionError::kind`]
    pub dropped: BTreeMap<String, usize>,
}

/// Output of one normalization pass
#[derive(Debug, Default)]
pub struct Normalized {
    pub detections: Vec<CanonicalDetection>,
    pub dropped: Vec<DroppedDetection>,
    pub stats: NormalizeStats,
}

/// Round to two decimals the way scores are reported
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Fill the explanation template with the entity type and rounded score
///
/// Accepts the positional `{}` placeholder as well as `{entity_type}` and
/// `{score}`.
pub fn format_explanation(template: &str, entity_type: &str, score: f64) -> String {
    let score = format!("{:.2}", round_score(score));
    let mut out = String::with_capacity(template.len() + entity_type.len());
    let mut positional_used = false;
    let mut rest = template;

    // Single pass, so substituted values are never scanned for placeholders
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        if let Some(after) = tail.strip_prefix("{entity_type}") {
            out.push_str(entity_type);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{score}") {
            out.push_str(&score);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{}").filter(|_| !positional_used) {
            out.push_str(entity_type);
            positional_used = true;
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Canonicalize labels, drop unsupported ones and remove exact-span duplicates
///
/// `detections` must be in merge order (start ascending, longer span first)
/// so the first detection seen for a span is the one kept.
pub fn normalize(detections: Vec<GlobalDetection>, config: &LabelConfig) -> Normalized {
    let mut out = Normalized::default();
    out.stats.input = detections.len();
    let mut seen_spans: HashSet<(usize, usize)> = HashSet::with_capacity(detections.len());

    for detection in detections {
        if config.is_ignored(&detection.label) {
            out.stats.ignored += 1;
            continue;
        }

        let entity_type = match canonical_type(&detection, config) {
            Ok(entity_type) => entity_type,
            Err(error) => {
                warn!(
                    window = detection.window_index,
                    label = %detection.label,
                    start = detection.start,
                    end = detection.end,
                    "Dropping detection: {}",
                    error
                );
                *out.stats.dropped.entry(error.kind().to_string()).or_default() += 1;
                out.dropped.push(DroppedDetection {
                    window_index: detection.window_index,
                    label: detection.label,
                    start: detection.start,
                    end: detection.end,
                    error,
                });
                continue;
            }
        };

        if !seen_spans.insert((detection.start, detection.end)) {
            out.stats.duplicates_removed += 1;
            continue;
        }

        let textual_explanation =
            format_explanation(&config.explanation_template, &entity_type, detection.score);
        out.detections.push(CanonicalDetection {
            entity_type,
            start: detection.start,
            end: detection.end,
            score: detection.score,
            explanation: Explanation {
                recognizer: RECOGNIZER_NAME.to_string(),
                original_score: round_score(detection.score),
                textual_explanation,
                pattern: detection.surface_text,
            },
        });
    }

    out.stats.accepted = out.detections.len();
    debug!(
        input = out.stats.input,
        accepted = out.stats.accepted,
        duplicates = out.stats.duplicates_removed,
        "Normalized detections"
    );
    out
}

fn canonical_type(detection: &GlobalDetection, config: &LabelConfig) -> Result<String, DetectionError> {
    if !(0.0..=1.0).contains(&detection.score) {
        return Err(DetectionError::MalformedDetection {
            message: format!("score {} outside [0, 1]", detection.score),
        });
    }

    let entity_type = config.label_map.resolve(&detection.label);
    if entity_type == UNSUPPORTED {
        return Err(DetectionError::UnmappedLabel { label: detection.label.clone() });
    }
    if config.is_ignored(entity_type) || !config.is_supported(entity_type) {
        return Err(DetectionError::UnsupportedEntity {
            label: detection.label.clone(),
            entity_type: entity_type.to_string(),
        });
    }
    Ok(entity_type.to_string())
}
