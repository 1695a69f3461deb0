//! Extractor driving the system unzip binary.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::ExtractorConfig;
use super::error::ExtractError;
use super::traits::ArchiveExtractor;
use super::types::ExtractedEntry;

/// Exit codes at which unzip reports damaged or truncated input.
/// 2 = generic zipfile error, 3 = severe zipfile error, 9 = not a zipfile,
/// 51 = truncated (end of archive missing).
const UNZIP_CORRUPT_EXIT_CODES: &[i32] = &[2, 3, 9, 51];

/// Archive extractor that spawns the system `unzip`.
pub struct CommandExtractor {
    config: ExtractorConfig,
}

impl CommandExtractor {
    /// Creates a new extractor with the given configuration.
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Creates an extractor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ExtractorConfig::default())
    }

    async fn run_unzip(&self, args: &[String]) -> Result<std::process::Output, ExtractError> {
        debug!(tool = %self.config.unzip_path.display(), ?args, "running unzip");

        let child = Command::new(&self.config.unzip_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractError::ToolNotFound {
                        path: self.config.unzip_path.clone(),
                    }
                } else {
                    ExtractError::Io(e)
                }
            })?;

        timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ExtractError::Timeout {
            timeout_secs: self.config.timeout_secs,
        })?
        .map_err(ExtractError::Io)
    }

    fn check_exit(output: &std::process::Output) -> Result<(), ExtractError> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        match output.status.code() {
            // 1 = warnings only, processing completed.
            Some(1) => Ok(()),
            Some(code) if UNZIP_CORRUPT_EXIT_CODES.contains(&code) => Err(ExtractError::corrupt(
                format!("unzip exited with {}: {}", code, stderr.trim()),
            )),
            _ => Err(ExtractError::ToolFailed {
                reason: format!("unzip exited with {}", output.status),
                stderr: Some(stderr),
            }),
        }
    }

    /// Walks `dest` and collects every regular file written.
    fn collect_entries(dest: &Path) -> Result<Vec<ExtractedEntry>, ExtractError> {
        let mut entries = Vec::new();
        let mut stack = vec![dest.to_path_buf()];

        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let file_type = entry.file_type()?;
                let path = entry.path();
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    let metadata = entry.metadata()?;
                    let relative_path = path
                        .strip_prefix(dest)
                        .map(PathBuf::from)
                        .unwrap_or_else(|_| path.clone());
                    entries.push(ExtractedEntry {
                        relative_path,
                        size_bytes: metadata.len(),
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(entries)
    }
}

#[async_trait]
impl ArchiveExtractor for CommandExtractor {
    fn name(&self) -> &str {
        "unzip"
    }

    async fn verify(&self, archive: &Path) -> Result<(), ExtractError> {
        if !archive.exists() {
            return Err(ExtractError::ArchiveNotFound {
                path: archive.to_path_buf(),
            });
        }
        let args = vec![
            "-t".to_string(),
            "-qq".to_string(),
            archive.to_string_lossy().to_string(),
        ];
        let output = self.run_unzip(&args).await?;
        Self::check_exit(&output)
    }

    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
    ) -> Result<Vec<ExtractedEntry>, ExtractError> {
        if !archive.exists() {
            return Err(ExtractError::ArchiveNotFound {
                path: archive.to_path_buf(),
            });
        }
        tokio::fs::create_dir_all(dest).await.map_err(ExtractError::Io)?;

        let args = vec![
            "-o".to_string(),
            "-qq".to_string(),
            archive.to_string_lossy().to_string(),
            "-d".to_string(),
            dest.to_string_lossy().to_string(),
        ];
        let output = self.run_unzip(&args).await?;
        Self::check_exit(&output)?;

        Self::collect_entries(dest)
    }
}
