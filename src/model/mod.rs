//! # Data Model
//!
//! Tipi strutturati che descrivono un singolo file durante l'elaborazione:
//! - `file_info`: record per-file (path, stato, dimensioni e hash in cache)
//! - `probe`: snapshot immutabile dell'output di ffprobe
//! - `marker`: codifica/decodifica del Processing Marker nel tag comment
//! - `ffmpeg_args`: specifica di encoding costruita a partire dai precedenti

pub mod ffmpeg_args;
pub mod file_info;
pub mod marker;
pub mod probe;

pub use ffmpeg_args::FFmpegArgs;
pub use file_info::{FileInfo, FileTaskStatus};
pub use marker::{ParsedComment, ProcessingMarker};
pub use probe::{ProbeInfo, StreamInfo};
