//! # Probe Model
//!
//! Snapshot immutabile dell'output JSON di ffprobe
//! (`-print_format json -show_format -show_streams`).
//!
//! ## Note:
//! - ffprobe serializza `bit_rate` e `duration` come stringhe
//! - `width`/`height` possono mancare: si ricade su `coded_width`/`coded_height`
//! - I nomi dei tag possono variare nel case (`comment`, `COMMENT`, ...)

use crate::error::CompressError;
use crate::platform::ToolCommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
    #[serde(default)]
    pub format: FormatInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub index: u32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub coded_width: Option<u32>,
    pub coded_height: Option<u32>,
    pub bit_rate: Option<String>,
    pub channels: Option<u32>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StreamInfo {
    pub fn is_video(&self) -> bool {
        Self::eq_lower(&self.codec_type, "video")
    }

    pub fn is_audio(&self) -> bool {
        Self::eq_lower(&self.codec_type, "audio")
    }

    /// Lowercased codec name, empty when unknown
    pub fn codec(&self) -> String {
        self.codec_name.as_deref().unwrap_or_default().to_lowercase()
    }

    pub fn bit_rate(&self) -> Option<u64> {
        self.bit_rate.as_deref().and_then(|b| b.trim().parse().ok())
    }

    /// Display size, falling back to the coded size
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let width = self.width.filter(|w| *w > 0).or(self.coded_width)?;
        let height = self.height.filter(|h| *h > 0).or(self.coded_height)?;
        Some((width, height))
    }

    fn eq_lower(value: &Option<String>, expected: &str) -> bool {
        value
            .as_deref()
            .map(|v| v.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }
}

impl ProbeInfo {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Container duration in seconds
    pub fn duration_secs(&self) -> Option<f64> {
        self.format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
    }

    /// Container tags with lowercased keys
    pub fn tags_lowercase(&self) -> BTreeMap<String, String> {
        self.format
            .tags
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect()
    }

    /// Container comment, looked up case-insensitively
    pub fn comment(&self) -> Option<String> {
        self.tags_lowercase().remove("comment")
    }
}

/// Run ffprobe against `path`
pub async fn probe(ffprobe: &ToolCommand, path: &Path) -> Result<ProbeInfo, CompressError> {
    debug!("Probing {}", path.display());

    let output = ffprobe
        .command()
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| CompressError::Probe {
            path: path.to_path_buf(),
            reason: format!("failed to execute {}: {}", ffprobe.program().display(), e),
        })?;

    if !output.status.success() {
        return Err(CompressError::Probe {
            path: path.to_path_buf(),
            reason: format!(
                "ffprobe exited with {}: {}",
                output.status,
                crate::utils::decode_output(&output.stderr).trim()
            ),
        });
    }

    let json = crate::utils::decode_output(&output.stdout);
    ProbeInfo::from_json(&json).map_err(|e| CompressError::Probe {
        path: path.to_path_buf(),
        reason: format!("unparsable ffprobe output: {}", e),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const VIDEO_PROBE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264",
             "width": 3840, "height": 2000, "coded_width": 3840, "coded_height": 2000},
            {"index": 1, "codec_type": "audio", "codec_name": "aac",
             "bit_rate": "128000", "channels": 2},
            {"index": 2, "codec_type": "video", "codec_name": "mjpeg",
             "width": 600, "height": 600}
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "120.500000",
            "size": "52428800",
            "bit_rate": "3480000",
            "tags": {"major_brand": "isom", "COMMENT": "shot on phone"}
        }
    }"#;

    #[test]
    fn test_parse_ffprobe_json() {
        let info = ProbeInfo::from_json(VIDEO_PROBE).unwrap();
        assert_eq!(info.streams.len(), 3);
        assert!(info.streams[0].is_video());
        assert!(info.streams[1].is_audio());
        assert_eq!(info.streams[1].bit_rate(), Some(128_000));
        assert_eq!(info.duration_secs(), Some(120.5));
        assert_eq!(info.comment().as_deref(), Some("shot on phone"));
    }

    #[test]
    fn test_coded_dimension_fallback() {
        let stream = StreamInfo {
            codec_type: Some("video".to_string()),
            coded_width: Some(1920),
            coded_height: Some(1080),
            ..Default::default()
        };
        assert_eq!(stream.dimensions(), Some((1920, 1080)));

        let stream = StreamInfo {
            width: Some(0),
            height: Some(0),
            ..Default::default()
        };
        assert_eq!(stream.dimensions(), None);
    }

    #[test]
    fn test_missing_sections_default() {
        let info = ProbeInfo::from_json("{}").unwrap();
        assert!(info.streams.is_empty());
        assert_eq!(info.duration_secs(), None);
        assert_eq!(info.comment(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_runs_tool() {
        let script = format!("cat <<'EOF'\n{}\nEOF", VIDEO_PROBE);
        let ffprobe = ToolCommand::new("sh").with_prefix_args(["-c", script.as_str(), "ffprobe"]);
        let info = probe(&ffprobe, Path::new("clip.mp4")).await.unwrap();
        assert_eq!(info.streams.len(), 3);

        let failing = ToolCommand::new("sh").with_prefix_args(["-c", "echo boom >&2; exit 1", "ffprobe"]);
        let err = probe(&failing, Path::new("clip.mp4")).await.unwrap_err();
        assert!(matches!(err, CompressError::Probe { .. }));
        assert!(err.to_string().contains("boom"));
    }
}
