//! # Placement Policy
//!
//! Decide dove finisce l'output dopo l'encoding.
//!
//! ## Regole:
//! - SUCCESS senza replace: l'output resta nella directory di output
//! - SUCCESS con replace: se l'output è più piccolo sostituisce l'originale,
//!   altrimenti viene scartato e si ripiega sullo stream copy
//! - PASS: l'output parziale viene scartato; con replace, stream copy
//! - SKIPPED / ERROR / SUSPEND: nessuna azione
//!
//! Lo stream copy ri-mux l'originale (senza ricodifica) in un file temporaneo
//! accanto all'input, così che l'originale riceva almeno il Processing Marker.

use crate::config::EncodeOption;
use crate::encoder::control::ControlHub;
use crate::encoder::Encoder;
use crate::file_manager::FileManager;
use crate::model::{FileInfo, FileTaskStatus, FFmpegArgs};
use crate::optimizer::path_resolver::PathResolver;
use crate::platform;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TEMP_PREFIX: &str = ".media-compressor-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementResult {
    /// Nothing to place for this status
    Untouched,
    /// Output stays in the output directory
    Kept(PathBuf),
    /// Output moved over the original
    Replaced {
        path: PathBuf,
        original_size: u64,
        new_size: u64,
    },
    /// Output deleted, original untouched
    Discarded,
    /// Output deleted, original re-muxed with the marker
    StreamCopied(FileTaskStatus),
    /// Move or delete failed; both files may remain on disk
    Failed(String),
}

pub struct Placement<'a> {
    encoder: &'a Encoder,
}

impl<'a> Placement<'a> {
    pub fn new(encoder: &'a Encoder) -> Self {
        Self { encoder }
    }

    /// Apply the placement rules for a finished encode
    pub async fn apply(&self, args: &mut FFmpegArgs, control: &mut ControlHub) -> Result<PlacementResult> {
        let option = args.option().clone();
        match args.file_info.status() {
            FileTaskStatus::Success if option.is_replace => {
                let ext = args.expected_ext();
                if let Some((original_size, new_size)) = Self::replace_original(&mut args.file_info, ext).await? {
                    let path = args.file_info.require_output_path()?.to_path_buf();
                    return Ok(PlacementResult::Replaced {
                        path,
                        original_size,
                        new_size,
                    });
                }
                info!("Original is smaller, discarding output");
                Self::discard_output(&args.file_info).await?;
                self.fallback(args.file_info.input_path(), option, control).await
            }
            FileTaskStatus::Success => Ok(PlacementResult::Kept(
                args.file_info.require_output_path()?.to_path_buf(),
            )),
            FileTaskStatus::Pass => {
                Self::discard_output(&args.file_info).await?;
                if option.is_replace {
                    self.fallback(args.file_info.input_path(), option, control).await
                } else {
                    Ok(PlacementResult::Discarded)
                }
            }
            _ => Ok(PlacementResult::Untouched),
        }
    }

    async fn fallback(
        &self,
        input: &Path,
        option: EncodeOption,
        control: &mut ControlHub,
    ) -> Result<PlacementResult> {
        let status = self.stream_copy(input, option, control).await?;
        Ok(PlacementResult::StreamCopied(status))
    }

    /// Move a smaller output over the original.
    ///
    /// Returns `(original_size, new_size)`, or `None` when the output is not
    /// smaller and nothing was moved.
    pub async fn replace_original(file_info: &mut FileInfo, ext: &str) -> Result<Option<(u64, u64)>> {
        let original_size = file_info.input_size().await?;
        let new_size = file_info.output_size().await?;
        if new_size >= original_size {
            return Ok(None);
        }

        let input = file_info.input_path().to_path_buf();
        let output = file_info.require_output_path()?.to_path_buf();
        let dest = PathResolver::replacement_path(&input, ext);
        if dest != input && dest.exists() {
            warn!("Overwriting existing {}", dest.display());
        }

        FileManager::move_file(&output, &dest).await?;
        platform::set_file_permission(&dest).await;
        if dest != input && input.is_file() {
            tokio::fs::remove_file(&input).await.map_err(|e| {
                anyhow::anyhow!("Replaced output but failed to remove {}: {}", input.display(), e)
            })?;
        }
        file_info.set_output_path(&dest);

        info!(
            "[OK] Replaced {} ({} -> {}, {:.1}% saved)",
            dest.display(),
            FileManager::format_size(original_size),
            FileManager::format_size(new_size),
            FileManager::calculate_reduction(original_size, new_size)
        );
        Ok(Some((original_size, new_size)))
    }

    /// Delete the output file if it exists
    pub async fn discard_output(file_info: &FileInfo) -> Result<()> {
        let Some(output) = file_info.output_path() else {
            return Ok(());
        };
        if output.is_file() {
            tokio::fs::remove_file(output)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to discard {}: {}", output.display(), e))?;
            debug!("Discarded {}", output.display());
        }
        Ok(())
    }

    /// Re-mux the original with stream copy and put it in place of the original
    pub async fn stream_copy(
        &self,
        input: &Path,
        option: EncodeOption,
        control: &mut ControlHub,
    ) -> Result<FileTaskStatus> {
        info!("Stream copy fallback for {}", input.display());

        let mut args = self.encoder.prepare(FileInfo::new(input)?, option).await?;
        let ext = args.expected_ext();
        let dir = input.parent().unwrap_or_else(|| Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(ext)
            .tempfile_in(dir)?
            .into_temp_path();
        args.file_info.set_output_path(temp.to_path_buf());

        self.encoder.build_copy_args(&mut args).await?;
        let status = self.encoder.encode(&mut args, control).await?;
        if status != FileTaskStatus::Success {
            warn!("Stream copy of {} ended with {}", input.display(), status);
            return Ok(status);
        }

        let dest = PathResolver::replacement_path(input, ext);
        FileManager::move_file(&temp, &dest).await?;
        platform::set_file_permission(&dest).await;
        if dest != input && input.is_file() {
            tokio::fs::remove_file(input).await?;
        }
        info!("[OK] Marker embedded by stream copy: {}", dest.display());
        Ok(status)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::encoder::tests::fake_ffmpeg;
    use crate::model::ffmpeg_args::tests::make_args;
    use crate::model::probe::tests::VIDEO_PROBE;
    use crate::platform::NATIVE_AAC;
    use tempfile::TempDir;

    /// Writes a tiny file for stream copies and a large one otherwise
    const SIZE_AWARE_FFMPEG: &str = r#"for last; do :; done
case "$*" in
  *"-c:a copy"*) printf 'copied' > "$last" ;;
  *) printf 'a much larger encoded output than the input' > "$last" ;;
esac"#;

    fn encoder(ffmpeg_body: &str) -> Encoder {
        let probe = format!("cat <<'EOF'\n{}\nEOF", VIDEO_PROBE);
        Encoder::with_aac_encoder(fake_ffmpeg(ffmpeg_body), fake_ffmpeg(&probe), NATIVE_AAC)
    }

    #[tokio::test]
    async fn test_smaller_output_replaces_original() {
        let temp_dir = TempDir::new().unwrap();
        let option = EncodeOption {
            is_replace: true,
            ..Default::default()
        };
        let mut args = make_args(&temp_dir, VIDEO_PROBE, option);
        let output = args.file_info.output_path().unwrap().to_path_buf();
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"small").unwrap();
        args.file_info.set_status(FileTaskStatus::Success);

        let encoder = encoder("exit 1");
        let result = Placement::new(&encoder)
            .apply(&mut args, &mut ControlHub::new())
            .await
            .unwrap();

        let dest = temp_dir.path().join("input.mp4");
        assert_eq!(
            result,
            PlacementResult::Replaced {
                path: dest.clone(),
                original_size: 13,
                new_size: 5
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"small");
        assert!(!temp_dir.path().join("input.mkv").exists());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_larger_output_falls_back_to_stream_copy() {
        let temp_dir = TempDir::new().unwrap();
        let option = EncodeOption {
            is_replace: true,
            ..Default::default()
        };
        let mut args = make_args(&temp_dir, VIDEO_PROBE, option);
        let output = args.file_info.output_path().unwrap().to_path_buf();
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"far too large to be worth keeping").unwrap();
        args.file_info.set_status(FileTaskStatus::Success);

        let encoder = encoder(SIZE_AWARE_FFMPEG);
        let result = Placement::new(&encoder)
            .apply(&mut args, &mut ControlHub::new())
            .await
            .unwrap();

        assert_eq!(result, PlacementResult::StreamCopied(FileTaskStatus::Success));
        assert!(!output.exists());
        assert_eq!(std::fs::read(temp_dir.path().join("input.mp4")).unwrap(), b"copied");
        assert!(!temp_dir.path().join("input.mkv").exists());

        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_pass_without_replace_discards() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let output = args.file_info.output_path().unwrap().to_path_buf();
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"partial").unwrap();
        args.file_info.set_status(FileTaskStatus::Pass);

        let encoder = encoder("exit 1");
        let result = Placement::new(&encoder)
            .apply(&mut args, &mut ControlHub::new())
            .await
            .unwrap();

        assert_eq!(result, PlacementResult::Discarded);
        assert!(!output.exists());
        assert!(temp_dir.path().join("input.mkv").exists());
    }

    #[tokio::test]
    async fn test_success_without_replace_keeps_output() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let output = args.file_info.output_path().unwrap().to_path_buf();
        args.file_info.set_status(FileTaskStatus::Success);

        let encoder = encoder("exit 1");
        let result = Placement::new(&encoder)
            .apply(&mut args, &mut ControlHub::new())
            .await
            .unwrap();
        assert_eq!(result, PlacementResult::Kept(output));
    }

    #[tokio::test]
    async fn test_error_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        args.file_info.set_status(FileTaskStatus::Error);

        let encoder = encoder("exit 1");
        let result = Placement::new(&encoder)
            .apply(&mut args, &mut ControlHub::new())
            .await
            .unwrap();
        assert_eq!(result, PlacementResult::Untouched);
    }
}
