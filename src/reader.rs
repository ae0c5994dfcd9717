use anyhow::Result;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

/// Configuration for document reading behavior
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Whether to fail fast on first error or continue processing
    pub fail_fast: bool,
    /// Buffer size for async reading (default: 8KB)
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            buffer_size: 8192, // WHY: 8KB is optimal for most filesystems and network storage
        }
    }
}

/// Statistics for one document read
#[derive(Debug, Clone)]
pub struct ReadStats {
    pub file_path: String,
    pub chars_read: u64,
    pub bytes_read: u64,
    pub duration_ms: u64,
    pub read_error: Option<String>,
}

impl ReadStats {
    fn failed(path: &Path, duration_ms: u64, error: String) -> Self {
        Self {
            file_path: path.display().to_string(),
            chars_read: 0,
            bytes_read: 0,
            duration_ms,
            read_error: Some(error),
        }
    }
}

/// Async reader that loads whole documents as UTF-8 text
pub struct DocumentReader {
    config: ReaderConfig,
}

impl DocumentReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    /// Read a document; with `fail_fast` off, errors come back in the stats
    /// alongside an empty text
    pub async fn read_document<P: AsRef<Path>>(&self, file_path: P) -> Result<(String, ReadStats)> {
        let path = file_path.as_ref();
        let start_time = std::time::Instant::now();

        debug!("Starting async read of document: {}", path.display());

        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                let error_msg = format!("Failed to open file {}: {}", path.display(), e);
                return self.fail(path, start_time, error_msg);
            }
        };

        // WHY: BufReader with custom buffer size reduces syscalls and improves throughput
        let mut reader = BufReader::with_capacity(self.config.buffer_size, file);
        let mut bytes = Vec::new();
        if let Err(e) = reader.read_to_end(&mut bytes).await {
            let error_msg = format!("Failed to read {}: {}", path.display(), e);
            return self.fail(path, start_time, error_msg);
        }

        let byte_count = bytes.len() as u64;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                let error_msg = format!(
                    "UTF-8 decoding error in {} at byte {}",
                    path.display(),
                    e.utf8_error().valid_up_to()
                );
                return self.fail(path, start_time, error_msg);
            }
        };

        let stats = ReadStats {
            file_path: path.display().to_string(),
            chars_read: text.chars().count() as u64,
            bytes_read: byte_count,
            duration_ms: start_time.elapsed().as_millis() as u64,
            read_error: None,
        };

        info!(
            "Successfully read {}: {} chars, {} bytes in {}ms",
            path.display(),
            stats.chars_read,
            stats.bytes_read,
            stats.duration_ms
        );
        Ok((text, stats))
    }

    fn fail(
        &self,
        path: &Path,
        start_time: std::time::Instant,
        error_msg: String,
    ) -> Result<(String, ReadStats)> {
        warn!("{}", error_msg);
        if self.config.fail_fast {
            return Err(anyhow::anyhow!(error_msg));
        }
        let stats = ReadStats::failed(path, start_time.elapsed().as_millis() as u64, error_msg);
        Ok((String::new(), stats))
    }
}
