// Integration tests for the HTTP inference backend against a local stub server
// WHY: Exercises the real reqwest client path without a model server

use pii_chunker::inference::{AggregationStrategy, HttpBackendConfig};
use pii_chunker::{
    DetectionPipeline, HttpInferenceBackend, InferenceBackend, InferenceError, LabelConfig,
    PipelineConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

mod integration;
use integration::stub_server;

fn backend(endpoint: String, token: Option<&str>) -> HttpInferenceBackend {
    HttpInferenceBackend::new(HttpBackendConfig {
        endpoint,
        api_token: token.map(str::to_string),
        aggregation_strategy: AggregationStrategy::Simple,
        request_timeout: Duration::from_secs(5),
    })
    .expect("Client creation should succeed")
}

#[tokio::test]
async fn test_http_backend_parses_predictions_and_sends_token() {
    let body = r#"[{"entity_group":"PER","score":0.998,"word":"Christopher","start":11,"end":22},
                   {"entity_group":"LOC","score":0.97,"word":"Irbid","start":37,"end":42}]"#;
    let (endpoint, captured) = stub_server(vec![(200, body.to_string())]).await;

    let detections = backend(endpoint, Some("secret-token"))
        .infer("My name is Christopher and I live in Irbid.")
        .await
        .expect("Inference should succeed");

    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].surface_text, "Christopher");

    let requests = captured.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].head.starts_with("POST /models/deid"));
    assert!(requests[0]
        .head
        .to_ascii_lowercase()
        .contains("authorization: bearer secret-token"));

    let sent: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(sent["inputs"], "My name is Christopher and I live in Irbid.");
    assert_eq!(sent["parameters"]["aggregation_strategy"], "simple");
}

#[tokio::test]
async fn test_http_backend_error_status() {
    let (endpoint, _) = stub_server(vec![(503, r#"{"error":"Model is loading"}"#.to_string())]).await;

    let result = backend(endpoint, None).infer("text").await;
    match result {
        Err(InferenceError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert!(body.contains("Model is loading"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_http_backend_connection_refused() {
    // bind then drop to get a port with nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = backend(format!("http://{addr}/"), None).infer("text").await;
    assert!(matches!(result, Err(InferenceError::Http(_))));
}

#[tokio::test]
async fn test_pipeline_over_http_backend() {
    let body = r#"[{"entity_group":"PATIENT","score":0.91,"word":"Christopher","start":11,"end":22},
                   {"entity_group":"O","score":0.5,"word":"and","start":23,"end":26},
                   {"entity_group":"PER","score":"high","word":"I","start":27,"end":28}]"#;
    let (endpoint, _) = stub_server(vec![(200, body.to_string())]).await;

    let pipeline = DetectionPipeline::new(
        Arc::new(backend(endpoint, None)),
        LabelConfig::stanford_deidentifier(),
        PipelineConfig::default(),
    )
    .unwrap();

    let report = pipeline
        .analyze("My name is Christopher and I live in Irbid.")
        .await
        .unwrap();

    assert!(report.failed_windows.is_empty());
    assert_eq!(report.stats.raw_detections, 2, "malformed element skipped at parse time");
    assert_eq!(report.stats.ignored, 1);
    assert_eq!(report.detections.len(), 1);
    assert_eq!(report.detections[0].entity_type, "PERSON");
    assert_eq!(report.detections[0].explanation.original_score, 0.91);
}
