//! # Argument Builder
//!
//! Trasforma probe + opzioni in argomenti ffmpeg, un passo alla volta.
//!
//! ## Responsabilità:
//! - `add_format_args`: container e nome del file di output
//! - `add_video_args`: encoder, CRF, preset e filtro di scala
//! - `add_audio_args`: copia o ricodifica per ogni stream audio
//! - `add_metadata_args`: Processing Marker e decisione SKIPPED
//! - `add_stream_copy_args`: variante senza ricodifica per il fallback
//!
//! Ogni passo, se non ha marcato il file come SKIPPED, porta lo stato
//! da INIT a WAITING (idempotente).

use crate::model::ffmpeg_args::{FFmpegArgs, FILENAME_KEY, FORMAT_KEY};
use crate::model::marker::ProcessingMarker;
use crate::model::FileTaskStatus;
use crate::error::CompressError;
use crate::utils::unix_now;
use anyhow::Result;
use tracing::{debug, info, warn};

pub const VIDEO_PRESET: &str = "veryslow";
/// Audio above this bitrate is re-encoded even if the codec is acceptable
pub const AUDIO_COPY_MAX_BITRATE: u64 = 512_000;
pub const AUDIO_TARGET_BITRATE: u64 = 320_000;
pub const AUDIO_CUTOFF_HZ: u32 = 20_000;
const AUDIO_COPY_CODECS: &[&str] = &["aac", "mp3"];

/// Container format and output filename
pub fn add_format_args(args: &mut FFmpegArgs) -> Result<()> {
    let output = args.file_info.require_output_path()?.to_path_buf();
    let output = FFmpegArgs::output_with_ext(&output, args.expected_ext());

    args.set(FORMAT_KEY, args.container_format());
    args.set(FILENAME_KEY, output.display());
    args.file_info.set_output_path(output);
    args.file_info.advance_to_waiting();
    Ok(())
}

/// Round half up (`2.5 -> 3`), never to even
fn round_half_up(value: f64) -> u64 {
    let floor = value.floor();
    if value - floor >= 0.5 {
        floor as u64 + 1
    } else {
        floor as u64
    }
}

/// Scale filter keeping both output dimensions even.
///
/// An odd `max_height` is rounded down to the even value below it.
pub fn compute_scale_filter(width: u32, height: u32, max_height: u32) -> String {
    let max_height = (max_height & !1).max(2);
    if height > max_height {
        let scaled = u64::from(width) as f64 * f64::from(max_height) / f64::from(height);
        let scaled_width = round_half_up(scaled);
        if scaled_width % 2 == 0 {
            format!("scale=-1:{}", max_height)
        } else {
            format!("scale=-2:{}", max_height)
        }
    } else {
        let even = |v: u32| if v % 2 == 1 { v + 1 } else { v };
        format!("scale={}:{}", even(width), even(height))
    }
}

/// Encoder, quality and scale for the selected video stream
pub fn add_video_args(args: &mut FFmpegArgs) -> Result<()> {
    let Some(video) = args.video_stream() else {
        args.file_info.advance_to_waiting();
        return Ok(());
    };

    let (width, height) = video.dimensions().ok_or_else(|| {
        CompressError::Validation(format!(
            "Video stream {} of {} has no dimensions",
            video.index,
            args.file_info.input_path().display()
        ))
    })?;

    let option = args.option().clone();
    let filter = compute_scale_filter(width, height, option.max_height);
    debug!("{}x{} -> {}", width, height, filter);

    args.set("c:v", option.codec.encoder_name());
    args.set("crf", option.effective_crf());
    args.set("preset", VIDEO_PRESET);
    args.set("vf", filter);
    args.file_info.advance_to_waiting();
    Ok(())
}

/// Per audio stream: copy when already acceptable, otherwise AAC re-encode
pub fn add_audio_args(args: &mut FFmpegArgs, aac_encoder: &str) -> Result<()> {
    let mut settings = Vec::new();
    for (idx, stream) in args.audio_streams().iter().enumerate() {
        let bit_rate = stream.bit_rate().filter(|b| *b > 0);
        let codec = stream.codec();
        let copy = bit_rate.map_or(false, |b| b < AUDIO_COPY_MAX_BITRATE)
            && AUDIO_COPY_CODECS.contains(&codec.as_str());

        if copy {
            settings.push((format!("c:a:{}", idx), "copy".to_string()));
        } else {
            let target = bit_rate.map_or(AUDIO_TARGET_BITRATE, |b| b.min(AUDIO_TARGET_BITRATE));
            settings.push((format!("c:a:{}", idx), aac_encoder.to_string()));
            settings.push((format!("b:a:{}", idx), target.to_string()));
        }
    }

    let reencodes = settings.iter().any(|(k, v)| k.starts_with("c:a:") && v != "copy");
    for (key, value) in settings {
        args.set(key, value);
    }
    if reencodes {
        args.set("cutoff", AUDIO_CUTOFF_HZ);
    }

    args.file_info.advance_to_waiting();
    Ok(())
}

/// Embed the Processing Marker, or mark SKIPPED when one is already there
pub async fn add_metadata_args(args: &mut FFmpegArgs) -> Result<()> {
    let parsed = args.parsed_comment();

    let marker = match parsed.marker.clone() {
        Some(_) if !args.option().is_force => {
            info!(
                "[SKIP] Already processed: {}",
                args.file_info.input_path().display()
            );
            args.file_info.set_status(FileTaskStatus::Skipped);
            return Ok(());
        }
        Some(old) if !old.fields().is_empty() => {
            warn!(
                "Re-encoding already processed file (force): {}",
                args.file_info.input_path().display()
            );
            old
        }
        _ => {
            let size = args.file_info.input_size().await?;
            let md5 = args.file_info.input_md5().await?;
            ProcessingMarker::fresh(size, &md5, unix_now())
        }
    };

    args.set("metadata", format!("comment={}", parsed.render_with(&marker)));
    args.set_marker(marker);
    args.file_info.advance_to_waiting();
    Ok(())
}

/// Copy every stream as-is
pub fn add_stream_copy_args(args: &mut FFmpegArgs) -> Result<()> {
    args.set("c:v", "copy");
    args.set("c:a", "copy");
    args.file_info.advance_to_waiting();
    Ok(())
}

/// Full pipeline for a regular encode.
///
/// Metadata runs first so a file that already carries the marker stops
/// as SKIPPED before any output path or codec argument is assigned. The
/// remaining steps keep the format, video, audio order.
pub async fn add_auto_args(args: &mut FFmpegArgs, aac_encoder: &str) -> Result<()> {
    add_metadata_args(args).await?;
    if args.file_info.status() == FileTaskStatus::Skipped {
        return Ok(());
    }
    add_format_args(args)?;
    add_video_args(args)?;
    add_audio_args(args, aac_encoder)
}

/// Pipeline for the stream-copy fallback
pub async fn add_copy_args(args: &mut FFmpegArgs) -> Result<()> {
    add_metadata_args(args).await?;
    if args.file_info.status() == FileTaskStatus::Skipped {
        return Ok(());
    }
    add_format_args(args)?;
    add_stream_copy_args(args)
}
