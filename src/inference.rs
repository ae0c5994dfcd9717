// WHY: The NER model is an opaque collaborator. The pipeline only depends on
// this trait, so tests script it and production talks to an HTTP endpoint

use crate::error::InferenceError;
use crate::realign::RawDetection;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// External token-classification model
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run the model on one window of text; offsets in the result are
    /// char positions local to `text`
    async fn infer(&self, text: &str) -> Result<Vec<RawDetection>, InferenceError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "inference"
    }
}

/// Sub-word aggregation requested from the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStrategy {
    None,
    Simple,
    First,
    Average,
    Max,
}

/// Configuration for [`HttpInferenceBackend`]
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub endpoint: String,
    pub api_token: Option<String>,
    pub aggregation_strategy: AggregationStrategy,
    /// Transport-level timeout; the pipeline applies its own per-window limit
    pub request_timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: None,
            aggregation_strategy: AggregationStrategy::Simple,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Serialize)]
struct InferenceParameters {
    aggregation_strategy: AggregationStrategy,
}

/// One element of a token-classification response
#[derive(Deserialize)]
struct EntityPrediction {
    #[serde(alias = "entity")]
    entity_group: String,
    score: f64,
    #[serde(default)]
    word: String,
    start: usize,
    end: usize,
}

/// Token-classification endpoint speaking the `{"inputs": ...}` protocol
pub struct HttpInferenceBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpInferenceBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn infer(&self, text: &str) -> Result<Vec<RawDetection>, InferenceError> {
        let request = InferenceRequest {
            inputs: text,
            parameters: InferenceParameters {
                aggregation_strategy: self.config.aggregation_strategy,
            },
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status: status.as_u16(), body });
        }

        let body: serde_json::Value = response.json().await?;
        let detections = parse_predictions(body)?;
        debug!(
            endpoint = %self.config.endpoint,
            chars = text.chars().count(),
            detections = detections.len(),
            "Inference call completed"
        );
        Ok(detections)
    }

    fn name(&self) -> &str {
        &self.config.endpoint
    }
}

/// Parse a response body element by element
///
/// A body that is not an array fails the whole window; an element that does
/// not match the expected shape is skipped with a warning.
pub fn parse_predictions(body: serde_json::Value) -> Result<Vec<RawDetection>, InferenceError> {
    let serde_json::Value::Array(items) = body else {
        return Err(InferenceError::InvalidResponse(format!(
            "expected a JSON array, got {}",
            truncate(&body.to_string(), 200)
        )));
    };

    let mut detections = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<EntityPrediction>(item) {
            Ok(p) => detections.push(RawDetection {
                start: p.start,
                end: p.end,
                label: p.entity_group,
                score: p.score,
                surface_text: p.word,
            }),
            Err(e) => warn!(index = i, "Skipping malformed prediction: {}", e),
        }
    }
    Ok(detections)
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
