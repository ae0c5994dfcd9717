pub mod chunker;
pub mod discovery;
pub mod document;
pub mod error;
pub mod inference;
pub mod labels;
pub mod normalizer;
pub mod output;
pub mod pipeline;
pub mod reader;
pub mod realign;

// Re-export the pipeline stages and their value types
pub use chunker::{compute_windows, plan_windows, ChunkingConfig, Window};
pub use document::Document;
pub use normalizer::{normalize, CanonicalDetection, Explanation, Normalized};
pub use realign::{merge, realign, DroppedDetection, GlobalDetection, RawDetection};

// Re-export configuration and orchestration
pub use error::{DetectionError, InferenceError, PipelineError};
pub use inference::{HttpBackendConfig, HttpInferenceBackend, InferenceBackend};
pub use labels::{LabelConfig, LabelMap};
pub use pipeline::{AnalysisReport, DetectionPipeline, DocumentStats, PipelineConfig};
