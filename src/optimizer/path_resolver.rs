//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di output:
//! nome nella directory di output, collisioni e path di sostituzione.

use crate::config::ExistsMode;
use crate::model::FFmpegArgs;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Utility per calcolare i path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// `<output_dir>/<input stem><ext>`
    pub fn get_output_path(input_path: &Path, output_dir: &Path, ext: &str) -> Result<PathBuf> {
        let file_stem = input_path
            .file_stem()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", input_path.display()))?
            .to_string_lossy();

        Ok(output_dir.join(format!("{}{}", file_stem, ext)))
    }

    /// Apply the collision policy; `None` means the file must be skipped
    pub fn resolve_collision(path: PathBuf, mode: ExistsMode) -> Option<PathBuf> {
        match mode {
            ExistsMode::Overwrite => Some(path),
            ExistsMode::Skip if path.is_file() => None,
            ExistsMode::Skip => Some(path),
            ExistsMode::Numbering => Some(Self::numbered(path)),
        }
    }

    /// First free `stem (n).ext`, or `path` itself when free
    pub fn numbered(path: PathBuf) -> PathBuf {
        if !path.is_file() {
            return path;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut count = 1;
        loop {
            let candidate = path.with_file_name(format!("{} ({}){}", stem, count, ext));
            if !candidate.is_file() {
                debug!("Numbered output: {}", candidate.display());
                return candidate;
            }
            count += 1;
        }
    }

    /// Where a replacing output lands: next to the input, with `ext`
    pub fn replacement_path(input_path: &Path, ext: &str) -> PathBuf {
        FFmpegArgs::output_with_ext(input_path, ext)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_path_uses_expected_ext() {
        let path = PathResolver::get_output_path(Path::new("/in/clip.final.mkv"), Path::new("out"), ".mp4").unwrap();
        assert_eq!(path, PathBuf::from("out/clip.final.mp4"));
    }

    #[test]
    fn test_numbering() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("clip.mp4");
        assert_eq!(PathResolver::numbered(base.clone()), base);

        std::fs::write(&base, b"x").unwrap();
        std::fs::write(temp_dir.path().join("clip (1).mp4"), b"x").unwrap();
        assert_eq!(
            PathResolver::numbered(base.clone()),
            temp_dir.path().join("clip (2).mp4")
        );
    }

    #[test]
    fn test_collision_modes() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("clip.mp4");
        std::fs::write(&existing, b"x").unwrap();

        assert_eq!(
            PathResolver::resolve_collision(existing.clone(), ExistsMode::Overwrite),
            Some(existing.clone())
        );
        assert_eq!(PathResolver::resolve_collision(existing.clone(), ExistsMode::Skip), None);
        assert_eq!(
            PathResolver::resolve_collision(existing, ExistsMode::Numbering),
            Some(temp_dir.path().join("clip (1).mp4"))
        );

        let free = temp_dir.path().join("other.mp4");
        assert_eq!(
            PathResolver::resolve_collision(free.clone(), ExistsMode::Skip),
            Some(free)
        );
    }

    #[test]
    fn test_replacement_path() {
        assert_eq!(
            PathResolver::replacement_path(Path::new("/media/clip.mkv"), ".mp4"),
            PathBuf::from("/media/clip.mp4")
        );
    }
}
