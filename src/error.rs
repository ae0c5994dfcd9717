// WHY: Typed error taxonomy so callers can tell fatal configuration errors
// apart from per-detection and per-window drops that never abort a document

use serde::Serialize;
use thiserror::Error;

/// Fatal pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Chunking or pipeline parameters violate their preconditions
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Reasons a single detection is dropped before it reaches the output
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DetectionError {
    /// Realigned span falls outside the document
    #[error("span [{start},{end}) exceeds document length {document_len}")]
    OffsetOutOfRange {
        start: usize,
        end: usize,
        document_len: usize,
    },

    /// Model output that cannot be trusted: bad score or empty span
    #[error("malformed detection: {message}")]
    MalformedDetection { message: String },

    /// Raw label has no entry in the label map
    #[error("label {label:?} is not in the label map")]
    UnmappedLabel { label: String },

    /// Label mapped to a type the caller does not accept
    #[error("entity {entity_type:?} (from label {label:?}) is not supported")]
    UnsupportedEntity { label: String, entity_type: String },
}

impl DetectionError {
    /// Short stable key used for per-reason counters
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OffsetOutOfRange { .. } => "offset_out_of_range",
            Self::MalformedDetection { .. } => "malformed_detection",
            Self::UnmappedLabel { .. } => "unmapped_label",
            Self::UnsupportedEntity { .. } => "unsupported_entity",
        }
    }
}

/// Failures of the external inference collaborator for one window
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected inference response: {0}")]
    InvalidResponse(String),

    #[error("inference timed out after {0}ms")]
    Timeout(u64),

    /// Catch-all for backends that are not HTTP based
    #[error("inference backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
