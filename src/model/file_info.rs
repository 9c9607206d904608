//! Per-file processing record and its task status.

use crate::dedup::SourceFile;
use crate::error::CompressError;
use crate::file_manager::FileManager;
use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// State of one file's encode session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileTaskStatus {
    /// No arguments built yet
    Init,
    /// Arguments built, ready to dispatch
    Waiting,
    Processing,
    /// Already carries the processing marker
    Skipped,
    Success,
    Error,
    /// Cancelled by the user; stops the whole batch
    Suspend,
    /// Abandoned by the size-skip policy
    Pass,
}

impl FileTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Success | Self::Error | Self::Suspend | Self::Pass
        )
    }
}

impl fmt::Display for FileTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Waiting => "WAITING",
            Self::Processing => "PROCESSING",
            Self::Skipped => "SKIPPED",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Suspend => "SUSPEND",
            Self::Pass => "PASS",
        };
        f.write_str(name)
    }
}

/// Size and MD5 of a file, the hash dropped whenever the size changes
#[derive(Debug, Clone, Default)]
struct CachedHash {
    size: Option<u64>,
    md5: Option<String>,
}

impl CachedHash {
    async fn size(&mut self, path: &Path) -> Result<u64> {
        let size = FileManager::file_size(path).await?;
        if self.size != Some(size) {
            if self.md5.is_some() {
                debug!("Size of {} changed, dropping cached hash", path.display());
            }
            self.size = Some(size);
            self.md5 = None;
        }
        Ok(size)
    }

    async fn md5(&mut self, path: &Path) -> Result<String> {
        self.size(path).await?;
        if let Some(ref md5) = self.md5 {
            return Ok(md5.clone());
        }
        let md5 = FileManager::md5_hash(path).await?;
        self.md5 = Some(md5.clone());
        Ok(md5)
    }
}

/// One input file's processing record
#[derive(Debug, Clone)]
pub struct FileInfo {
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    status: FileTaskStatus,
    input: CachedHash,
    output: CachedHash,
}

impl FileInfo {
    /// Fails unless `input_path` is an existing regular file
    pub fn new(input_path: impl Into<PathBuf>) -> Result<Self, CompressError> {
        let input_path = input_path.into();
        if !input_path.is_file() {
            return Err(CompressError::Validation(format!(
                "Input file does not exist: {}",
                input_path.display()
            )));
        }

        Ok(Self {
            input_path,
            output_path: None,
            status: FileTaskStatus::Init,
            input: CachedHash::default(),
            output: CachedHash::default(),
        })
    }

    /// Seed the cache with what discovery already measured
    pub fn from_source(source: &SourceFile) -> Result<Self, CompressError> {
        let mut info = Self::new(&source.path)?;
        info.input = CachedHash {
            size: Some(source.size),
            md5: source.md5.clone(),
        };
        Ok(info)
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn set_output_path(&mut self, path: impl Into<PathBuf>) {
        self.output_path = Some(path.into());
    }

    /// Output path, or an error when placement has not assigned one yet
    pub fn require_output_path(&self) -> Result<&Path, CompressError> {
        self.output_path
            .as_deref()
            .ok_or_else(|| CompressError::OutputPathUnassigned(self.input_path.clone()))
    }

    pub fn status(&self) -> FileTaskStatus {
        self.status
    }

    pub fn set_status(&mut self, status: FileTaskStatus) {
        if self.status != status {
            debug!("{}: {} -> {}", self.input_path.display(), self.status, status);
            self.status = status;
        }
    }

    /// INIT becomes WAITING; any other status is left alone
    pub fn advance_to_waiting(&mut self) {
        if self.status == FileTaskStatus::Init {
            self.set_status(FileTaskStatus::Waiting);
        }
    }

    pub async fn input_size(&mut self) -> Result<u64> {
        self.input.size(&self.input_path).await
    }

    pub async fn input_md5(&mut self) -> Result<String> {
        self.input.md5(&self.input_path).await
    }

    pub async fn output_size(&mut self) -> Result<u64> {
        let path = self.require_output_path()?.to_path_buf();
        self.output.size(&path).await
    }

    pub fn output_exists(&self) -> bool {
        self.output_path.as_deref().map_or(false, Path::is_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_input_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(FileInfo::new(temp_dir.path().join("missing.mp4")).is_err());
        assert!(FileInfo::new(temp_dir.path()).is_err());
    }

    #[test]
    fn test_status_transitions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp4");
        std::fs::write(&path, b"x").unwrap();

        let mut info = FileInfo::new(&path).unwrap();
        assert_eq!(info.status(), FileTaskStatus::Init);
        info.advance_to_waiting();
        assert_eq!(info.status(), FileTaskStatus::Waiting);
        info.advance_to_waiting();
        assert_eq!(info.status(), FileTaskStatus::Waiting);

        info.set_status(FileTaskStatus::Skipped);
        info.advance_to_waiting();
        assert_eq!(info.status(), FileTaskStatus::Skipped);
        assert!(info.status().is_terminal());
        assert!(!FileTaskStatus::Processing.is_terminal());
    }

    #[tokio::test]
    async fn test_hash_invalidated_on_size_change() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp4");
        std::fs::write(&path, b"hello world").unwrap();

        let mut info = FileInfo::new(&path).unwrap();
        assert_eq!(info.input_size().await.unwrap(), 11);
        let first = info.input_md5().await.unwrap();
        assert_eq!(first, "5eb63bbbe01eeed093cb22bb8f5acdc3");

        std::fs::write(&path, b"hello").unwrap();
        let second = info.input_md5().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(info.input_size().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_seeded_hash_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp4");
        std::fs::write(&path, b"abc").unwrap();

        let source = SourceFile {
            target: temp_dir.path().to_path_buf(),
            path: path.clone(),
            size: 3,
            md5: Some("seeded".to_string()),
        };
        let mut info = FileInfo::from_source(&source).unwrap();
        assert_eq!(info.input_md5().await.unwrap(), "seeded");
    }

    #[tokio::test]
    async fn test_output_requires_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp4");
        std::fs::write(&path, b"abc").unwrap();

        let mut info = FileInfo::new(&path).unwrap();
        assert!(info.output_size().await.is_err());
        assert!(!info.output_exists());

        let out = temp_dir.path().join("out.mp4");
        std::fs::write(&out, b"abcdef").unwrap();
        info.set_output_path(&out);
        assert_eq!(info.output_size().await.unwrap(), 6);
        assert!(info.output_exists());
    }
}
