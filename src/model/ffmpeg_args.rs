//! # Encode Specification
//!
//! `FFmpegArgs` raccoglie tutto ciò che serve per lanciare ffmpeg su un file:
//! opzioni, record del file, probe, stream selezionati e la mappa
//! chiave → valore degli argomenti di output.
//!
//! ## Responsabilità:
//! - Selezione degli stream (un solo video, tutti gli audio)
//! - Proprietà derivate: solo audio, estensione attesa, stream copy
//! - Rendering della riga di comando finale per ffmpeg
//!
//! Le chiavi `filename` e `format` sono speciali: diventano `-f <format> <filename>`
//! in coda al comando; tutte le altre diventano `-<chiave> <valore>`.

use crate::args;
use crate::config::EncodeOption;
use crate::error::CompressError;
use crate::model::file_info::FileInfo;
use crate::model::marker::{self, ParsedComment, ProcessingMarker};
use crate::model::probe::{self, ProbeInfo, StreamInfo};
use crate::platform::ToolCommand;
use std::collections::BTreeMap;
use std::path::Path;

/// Attached-picture codecs never mapped into the output
pub const IGNORED_STREAM_CODECS: &[&str] = &["mjpeg", "png", "bmp", "gif"];

pub const FILENAME_KEY: &str = "filename";
pub const FORMAT_KEY: &str = "format";

const COPY: &str = "copy";

#[derive(Debug, Clone)]
pub struct FFmpegArgs {
    pub file_info: FileInfo,
    option: EncodeOption,
    probe: ProbeInfo,
    video_stream: Option<StreamInfo>,
    audio_streams: Vec<StreamInfo>,
    marker: Option<ProcessingMarker>,
    args: BTreeMap<String, String>,
}

impl FFmpegArgs {
    /// Build from an existing probe result
    pub fn from_probe(
        file_info: FileInfo,
        option: EncodeOption,
        probe: ProbeInfo,
    ) -> Result<Self, CompressError> {
        let video_stream = probe
            .streams
            .iter()
            .find(|s| s.is_video() && !Self::is_ignored_codec(s))
            .cloned();
        let audio_streams: Vec<StreamInfo> =
            probe.streams.iter().filter(|s| s.is_audio()).cloned().collect();

        if video_stream.is_none() && audio_streams.is_empty() {
            return Err(CompressError::NoUsableStream(file_info.input_path().to_path_buf()));
        }

        Ok(Self {
            file_info,
            option,
            probe,
            video_stream,
            audio_streams,
            marker: None,
            args: BTreeMap::new(),
        })
    }

    /// Probe the input with ffprobe, then build
    pub async fn probe_file(
        ffprobe: &ToolCommand,
        file_info: FileInfo,
        option: EncodeOption,
    ) -> Result<Self, CompressError> {
        let probe = probe::probe(ffprobe, file_info.input_path()).await?;
        Self::from_probe(file_info, option, probe)
    }

    fn is_ignored_codec(stream: &StreamInfo) -> bool {
        IGNORED_STREAM_CODECS.contains(&stream.codec().as_str())
    }

    pub fn option(&self) -> &EncodeOption {
        &self.option
    }

    pub fn probe(&self) -> &ProbeInfo {
        &self.probe
    }

    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.video_stream.as_ref()
    }

    pub fn audio_streams(&self) -> &[StreamInfo] {
        &self.audio_streams
    }

    pub fn is_only_audio(&self) -> bool {
        self.video_stream.is_none() && !self.audio_streams.is_empty()
    }

    /// `.m4a` for audio-only inputs, `.mp4` otherwise
    pub fn expected_ext(&self) -> &'static str {
        if self.is_only_audio() {
            ".m4a"
        } else {
            ".mp4"
        }
    }

    /// Container format handed to `-f`
    pub fn container_format(&self) -> &'static str {
        if self.is_only_audio() {
            "ipod"
        } else {
            "mp4"
        }
    }

    /// Every stream is copied, nothing re-encoded
    pub fn is_stream_copy(&self) -> bool {
        let audio_copy = self.audio_streams.is_empty() || self.get("c:a") == Some(COPY);
        let video_copy = self.video_stream.is_none() || self.get("c:v") == Some(COPY);
        audio_copy && video_copy && (self.get("c:a").is_some() || self.get("c:v").is_some())
    }

    /// Decode with CUDA, except for audio-only inputs and WMV video
    pub fn use_cuda(&self) -> bool {
        self.option.is_cuda
            && !self.is_only_audio()
            && self
                .video_stream
                .as_ref()
                .map_or(false, |v| !v.codec().starts_with("wmv"))
    }

    /// Existing comment tag split into user text and marker
    pub fn parsed_comment(&self) -> ParsedComment {
        self.probe
            .comment()
            .map(|c| marker::parse_comment(&c))
            .unwrap_or_default()
    }

    pub fn marker(&self) -> Option<&ProcessingMarker> {
        self.marker.as_ref()
    }

    pub fn set_marker(&mut self, marker: ProcessingMarker) {
        self.marker = Some(marker);
    }

    /// Marker fields destined for the comment tag
    pub fn metadata(&self) -> &[(String, String)] {
        self.marker.as_ref().map(|m| m.fields()).unwrap_or(&[])
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.args.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    /// Streams mapped into the output, and the ones left out
    pub fn partition_streams(&self) -> (Vec<&StreamInfo>, Vec<&StreamInfo>) {
        self.probe
            .streams
            .iter()
            .partition(|s| (s.is_video() || s.is_audio()) && !Self::is_ignored_codec(s))
    }

    /// Full argument list for ffmpeg (program name excluded)
    pub fn command_args(&self, with_progress: bool) -> Result<Vec<String>, CompressError> {
        let filename = self
            .get(FILENAME_KEY)
            .ok_or_else(|| CompressError::OutputPathUnassigned(self.file_info.input_path().to_path_buf()))?;
        let format = self.get(FORMAT_KEY).unwrap_or_else(|| self.container_format());

        let mut out = args!["-hide_banner", "-y"];
        if with_progress {
            out.extend(args!["-progress", "pipe:1", "-nostats"]);
        }
        if self.use_cuda() {
            out.extend(args!["-hwaccel", "cuda"]);
        }
        out.extend(args!["-i", self.file_info.input_path().display()]);

        let (mapped, _) = self.partition_streams();
        for stream in mapped {
            out.extend(args!["-map", format!("0:{}", stream.index)]);
        }

        for (key, value) in &self.args {
            if key == FILENAME_KEY || key == FORMAT_KEY {
                continue;
            }
            out.push(format!("-{}", key));
            out.push(value.clone());
        }

        out.extend(args!["-f", format, filename]);
        Ok(out)
    }

    /// Pretty dump of every input for debugging
    pub fn summary(&self) -> String {
        let view = serde_json::json!({
            "encode_option": self.option,
            "file_info": {
                "input": self.file_info.input_path(),
                "output": self.file_info.output_path(),
                "status": self.file_info.status().to_string(),
            },
            "probe_info": self.probe,
            "metadata": self.metadata(),
            "args": self.args,
        });
        serde_json::to_string_pretty(&view).unwrap_or_else(|_| format!("{:?}", self))
    }

    /// Output path with `ext` in place of the current extension
    pub fn output_with_ext(path: &Path, ext: &str) -> std::path::PathBuf {
        let mut name = path.file_stem().unwrap_or_default().to_os_string();
        name.push(ext);
        path.with_file_name(name)
    }
}
