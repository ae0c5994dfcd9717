use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Configuration for input discovery behavior
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Whether to fail fast on first error or continue processing
    pub fail_fast: bool,
    /// File extension (without dot) picked up when walking directories
    pub extension: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            extension: "txt".to_string(),
        }
    }
}

/// Result of input validation
#[derive(Debug, Clone)]
pub struct FileValidation {
    pub path: PathBuf,
    pub error: Option<String>,
}

impl FileValidation {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Expand CLI inputs into a sorted, de-duplicated list of documents
///
/// Files are taken as given regardless of extension; directories are walked
/// recursively for files matching `config.extension`.
pub async fn collect_input_files(
    inputs: &[PathBuf],
    config: &DiscoveryConfig,
) -> Result<Vec<FileValidation>> {
    let mut files = Vec::new();

    for input in inputs {
        match fs::metadata(input).await {
            Ok(metadata) if metadata.is_dir() => {
                let root = input.clone();
                let extension = config.extension.clone();
                // WHY: directory walking is blocking I/O, keep it off the async workers
                let found = tokio::task::spawn_blocking(move || walk_directory(&root, &extension))
                    .await
                    .context("Directory walk task panicked")??;
                debug!("Found {} files under {}", found.len(), input.display());
                files.extend(found.into_iter().map(|path| FileValidation { path, error: None }));
            }
            Ok(_) => files.push(FileValidation { path: input.clone(), error: None }),
            Err(e) => {
                let error = format!("Cannot access input {}: {}", input.display(), e);
                warn!("{}", error);
                if config.fail_fast {
                    return Err(anyhow::anyhow!(error));
                }
                files.push(FileValidation { path: input.clone(), error: Some(error) });
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);

    let valid_count = files.iter().filter(|f| f.is_valid()).count();
    info!(
        "Input discovery summary: {} valid, {} invalid",
        valid_count,
        files.len() - valid_count
    );
    Ok(files)
}

fn walk_directory(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let walker = WalkBuilder::new(root)
        .follow_links(false)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .build();

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Directory walk error (continuing): {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) == Some(extension) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, relative: &str) -> PathBuf {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "text").unwrap();
        path
    }

    #[tokio::test]
    async fn test_walks_directories_for_extension() {
        let temp_dir = TempDir::new().unwrap();
        let a = touch(temp_dir.path(), "notes/a.txt");
        let b = touch(temp_dir.path(), "notes/deep/b.txt");
        touch(temp_dir.path(), "notes/c.json");

        let files = collect_input_files(&[temp_dir.path().to_path_buf()], &DiscoveryConfig::default())
            .await
            .unwrap();

        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![a, b]);
    }

    #[tokio::test]
    async fn test_explicit_file_kept_regardless_of_extension() {
        let temp_dir = TempDir::new().unwrap();
        let file = touch(temp_dir.path(), "report.md");

        let files = collect_input_files(&[file.clone(), file.clone()], &DiscoveryConfig::default())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, file);
    }

    #[tokio::test]
    async fn test_missing_input_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.txt");

        let files = collect_input_files(&[missing.clone()], &DiscoveryConfig::default())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].is_valid());

        let config = DiscoveryConfig { fail_fast: true, ..Default::default() };
        assert!(collect_input_files(&[missing], &config).await.is_err());
    }

    #[tokio::test]
    async fn test_hidden_directories_included() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), ".archive/old.txt");

        let files = collect_input_files(&[temp_dir.path().to_path_buf()], &DiscoveryConfig::default())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
    }
}
