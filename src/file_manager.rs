//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery di media.
//!
//! ## Responsabilità:
//! - Discovery di file media da un file, una directory (ricorsiva) o un file `.list`
//! - Filtro case-insensitive sulle estensioni (`FilterConfig`)
//! - Esclusione dei link simbolici sui sistemi POSIX
//! - Hash MD5 a blocchi per la deduplicazione e il marker
//! - Spostamento sicuro dei file (rename con fallback copy + remove)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Input supportati:
//! - **File singolo**: restituito così com'è
//! - **Directory**: scansione ricorsiva, ordinata per nome, file nascosti esclusi
//! - **`.list`**: un path per riga, con virgolette e virgole finali rimosse
//!
//! ## Esempio:
//! ```rust,ignore
//! let filter = FilterConfig::default();
//! for file in FileManager::get_media_files(Path::new("/media"), Some(&filter)) {
//!     let hash = FileManager::md5_hash(&file).await?;
//! }
//! ```

use crate::config::FilterConfig;
use anyhow::Result;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Read size used while hashing
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Expand one input path into candidate media files.
    ///
    /// Unreadable or vanished paths yield nothing; they are logged, not fatal.
    pub fn get_media_files(input: &Path, filter: Option<&FilterConfig>) -> Vec<PathBuf> {
        if Self::is_symlink(input) {
            debug!("Skipping symbolic link: {}", input.display());
            return Vec::new();
        }

        if input.is_file() {
            if Self::is_list_file(input) {
                return Self::read_list_file(input, filter);
            }
            return vec![input.to_path_buf()];
        }

        if input.is_dir() {
            return Self::find_media_files(input, filter);
        }

        warn!("Input path not found: {}", input.display());
        Vec::new()
    }

    /// Recursive, name-ordered directory scan
    pub fn find_media_files(media_dir: &Path, filter: Option<&FilterConfig>) -> Vec<PathBuf> {
        WalkDir::new(media_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !Self::is_hidden(e))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            // WalkDir non segue i link: i symlink hanno file_type() symlink
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| Self::passes_filter(path, filter))
            .collect()
    }

    fn read_list_file(list_path: &Path, filter: Option<&FilterConfig>) -> Vec<PathBuf> {
        let content = match std::fs::read(list_path) {
            Ok(bytes) => crate::utils::decode_output(&bytes),
            Err(e) => {
                warn!("Failed to read list file {}: {}", list_path.display(), e);
                return Vec::new();
            }
        };

        content
            .lines()
            .map(Self::clean_list_line)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .filter(|path| path.is_file() && !Self::is_symlink(path))
            .filter(|path| Self::passes_filter(path, filter))
            .collect()
    }

    /// Strip whitespace, quotes and trailing commas from a `.list` line
    fn clean_list_line(line: &str) -> &str {
        line.trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == ',')
            .trim()
    }

    fn passes_filter(path: &Path, filter: Option<&FilterConfig>) -> bool {
        filter.map_or(true, |f| f.accepts(path))
    }

    fn is_list_file(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("list"))
            .unwrap_or(false)
    }

    fn is_hidden(entry: &DirEntry) -> bool {
        entry.file_name().to_string_lossy().starts_with('.')
    }

    /// Symbolic links are excluded on POSIX systems only
    pub fn is_symlink(path: &Path) -> bool {
        cfg!(unix)
            && std::fs::symlink_metadata(path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)
    }

    /// Hex MD5 of a file's content, read in 64 KiB blocks
    pub async fn md5_hash(path: &Path) -> Result<String> {
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open {} for hashing: {}", path.display(), e))?;
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; HASH_BLOCK_SIZE];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Current size of a file in bytes
    pub async fn file_size(path: &Path) -> Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Move a file, copying across filesystems when rename is not possible
    pub async fn move_file(source: &Path, target: &Path) -> Result<()> {
        if fs::rename(source, target).await.is_ok() {
            return Ok(());
        }

        fs::copy(source, target).await.map_err(|e| {
            anyhow::anyhow!("Failed to copy {} to {}: {}", source.display(), target.display(), e)
        })?;
        fs::remove_file(source).await.map_err(|e| {
            anyhow::anyhow!("Failed to remove {} after copy: {}", source.display(), e)
        })?;
        Ok(())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
