// Integration test utilities and common code
// WHY: Centralized fixtures and scripted backends avoid duplication across integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use pii_chunker::{InferenceBackend, InferenceError, RawDetection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Test fixture helper for creating temporary directories with documents
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();

        Self { temp_dir, root_path }
    }

    /// Create a document with given content
    pub fn create_document<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        let file_path = self.root_path.join(relative_path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }
}

/// Filler text of exactly `len` chars without capital letters
pub fn filler(len: usize) -> String {
    "lorem ipsum dolor sit amet ".chars().cycle().take(len).collect()
}

/// Place `word` at char position `at` inside `len` chars of filler
pub fn document_with(len: usize, placements: &[(usize, &str)]) -> String {
    let mut chars: Vec<char> = filler(len).chars().collect();
    for (at, word) in placements {
        for (i, c) in word.chars().enumerate() {
            chars[at + i] = c;
        }
    }
    chars.into_iter().collect()
}

/// Reports every occurrence of known surface forms, like a dictionary model
pub struct GazetteerBackend {
    entries: Vec<(String, String, f64)>,
}

impl GazetteerBackend {
    pub fn new(entries: &[(&str, &str, f64)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(surface, label, score)| (surface.to_string(), label.to_string(), *score))
                .collect(),
        }
    }

    pub fn detect(&self, text: &str) -> Vec<RawDetection> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = Vec::new();
        for (surface, label, score) in &self.entries {
            let needle: Vec<char> = surface.chars().collect();
            if needle.is_empty() || needle.len() > chars.len() {
                continue;
            }
            for start in 0..=(chars.len() - needle.len()) {
                if chars[start..start + needle.len()] == needle[..] {
                    out.push(RawDetection {
                        start,
                        end: start + needle.len(),
                        label: label.clone(),
                        score: *score,
                        surface_text: surface.clone(),
                    });
                }
            }
        }
        out
    }
}

#[async_trait]
impl InferenceBackend for GazetteerBackend {
    async fn infer(&self, text: &str) -> Result<Vec<RawDetection>, InferenceError> {
        Ok(self.detect(text))
    }
}

/// Gazetteer that fails or stalls on windows containing marker words
pub struct FlakyBackend {
    pub inner: GazetteerBackend,
    pub fail_marker: String,
    pub slow_marker: String,
    pub slow_delay: Duration,
}

#[async_trait]
impl InferenceBackend for FlakyBackend {
    async fn infer(&self, text: &str) -> Result<Vec<RawDetection>, InferenceError> {
        if text.contains(&self.fail_marker) {
            return Err(InferenceError::Backend("model server overloaded".to_string()));
        }
        if text.contains(&self.slow_marker) {
            tokio::time::sleep(self.slow_delay).await;
        }
        Ok(self.inner.detect(text))
    }
}

/// Returns a fixed set of raw detections for every window
pub struct FixedBackend {
    pub detections: Vec<RawDetection>,
}

#[async_trait]
impl InferenceBackend for FixedBackend {
    async fn infer(&self, _text: &str) -> Result<Vec<RawDetection>, InferenceError> {
        Ok(self.detections.clone())
    }
}

/// Gazetteer that records the peak number of concurrent calls
pub struct CountingBackend {
    pub inner: GazetteerBackend,
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl CountingBackend {
    pub fn new(inner: GazetteerBackend, delay: Duration) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl InferenceBackend for CountingBackend {
    async fn infer(&self, text: &str) -> Result<Vec<RawDetection>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.inner.detect(text))
    }
}

pub fn raw(start: usize, end: usize, label: &str, score: f64) -> RawDetection {
    RawDetection {
        start,
        end,
        label: label.to_string(),
        score,
        surface_text: String::new(),
    }
}

/// Captured request: headers and body
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub head: String,
    pub body: String,
}

/// Serve `responses` in order, one per connection, recording each request
pub async fn stub_server(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind stub server");
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut socket, _)) = listener.accept().await else { return };
            let request = read_request(&mut socket).await;
            sink.lock().unwrap().push(request);

            let response = format!(
                "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/models/deid"), captured)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Captured {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buffer).to_string();
        if let Some(split) = text.find("\r\n\r\n") {
            let head = text[..split].to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            let body_start = split + 4;
            if buffer.len() >= body_start + content_length {
                let body = String::from_utf8_lossy(&buffer[body_start..body_start + content_length]).to_string();
                return Captured { head, body };
            }
        }
    }
    Captured::default()
}
