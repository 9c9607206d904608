//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `EncodeOption` con i parametri di encoding per-file
//! - Definisce `BatchConfig` con i parametri del batch (input, output, policy)
//! - Gestisce la allow-list delle estensioni persistita in YAML (`FilterConfig`)
//! - Fornisce validazione e valori di default sensati
//!
//! ## Parametri di encoding:
//! - `max_height`: Altezza massima dell'output (default: 1440)
//! - `codec`: Codec video (h264 / h265, default: h264)
//! - `crf`: CRF esplicito (0-51); se assente dipende dal codec (23 / 28)
//! - `is_force`: Ricodifica anche file già marcati come processati
//! - `remove_error_output`: Rimuove output parziali in caso di errore (default: true)
//! - `is_cuda`: Decodifica hardware CUDA
//! - `is_replace`: Sostituisce l'originale se l'output è più piccolo
//! - `is_size_skip`: Interrompe l'encoding se l'output supera l'input
//!
//! ## Esempio:
//! ```rust,ignore
//! let option = EncodeOption {
//!     codec: VideoCodec::H265,
//!     is_replace: true,
//!     ..Default::default()
//! };
//! option.validate()?;
//! assert_eq!(option.effective_crf(), 28);
//! ```

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default allow-list written to the filter file on first run
pub const DEFAULT_EXTS: &[&str] = &[
    ".3gp", ".3g2", ".aif", ".aac", ".ac3", ".avi", ".flac", ".flv", ".webm", ".mkv", ".mov",
    ".m4v", ".mp4", ".m4a", ".mp2", ".mp3", ".ogg", ".mpg", ".mpeg", ".ts", ".m3u8", ".asf",
    ".wav", ".wmv", ".wma",
];

/// Video codec choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    #[value(name = "h264", alias = "h.264")]
    H264,
    #[value(name = "h265", alias = "h.265")]
    H265,
}

impl VideoCodec {
    /// ffmpeg encoder implementing this codec
    pub fn encoder_name(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
        }
    }

    pub fn default_crf(&self) -> u8 {
        match self {
            Self::H264 => 23,
            Self::H265 => 28,
        }
    }
}

/// Options applied to every file of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeOption {
    /// Maximum output height in pixels
    pub max_height: u32,
    /// Re-encode files that already carry the processing marker
    pub is_force: bool,
    pub codec: VideoCodec,
    /// Explicit CRF (0-51). `None` uses the codec default
    pub crf: Option<u8>,
    /// Delete partial output on ERROR/SUSPEND
    pub remove_error_output: bool,
    pub use_progressbar: bool,
    /// Keep finished per-file bars on screen
    pub leave: bool,
    /// Request CUDA hardware decoding
    pub is_cuda: bool,
    /// Replace the original when the output is smaller
    pub is_replace: bool,
    /// Abort encodes whose output grows past the input size
    pub is_size_skip: bool,
}

impl Default for EncodeOption {
    fn default() -> Self {
        Self {
            max_height: 1440,
            is_force: false,
            codec: VideoCodec::default(),
            crf: None,
            remove_error_output: true,
            use_progressbar: false,
            leave: true,
            is_cuda: false,
            is_replace: false,
            is_size_skip: false,
        }
    }
}

impl EncodeOption {
    /// CRF actually passed to the encoder
    pub fn effective_crf(&self) -> u8 {
        self.crf.unwrap_or_else(|| self.codec.default_crf())
    }

    /// Validate encoding parameters
    pub fn validate(&self) -> Result<()> {
        if let Some(crf) = self.crf {
            if crf > 51 {
                return Err(anyhow::anyhow!("Video CRF must be between 0 and 51"));
            }
        }

        if self.max_height == 0 {
            return Err(anyhow::anyhow!("Max height must be greater than 0"));
        }

        if self.max_height % 2 == 1 {
            return Err(anyhow::anyhow!(
                "Max height must be even, got {}",
                self.max_height
            ));
        }

        Ok(())
    }
}

/// Collision policy when the output path already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExistsMode {
    Overwrite,
    Skip,
    #[default]
    Numbering,
}

/// Ordering of the batch by input file size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[value(name = "asc")]
    Ascending,
    #[value(name = "desc")]
    Descending,
    #[default]
    None,
}

/// Configuration of one batch invocation
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Files, directories or `.list` files
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub exists_mode: ExistsMode,
    pub sort_mode: SortMode,
    /// Discovery only, no encoding
    pub scan_only: bool,
    /// Location of the extension allow-list
    pub filter_path: PathBuf,
    /// Template cloned for every file
    pub option: EncodeOption,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output_dir: PathBuf::from("out"),
            exists_mode: ExistsMode::default(),
            sort_mode: SortMode::default(),
            scan_only: false,
            filter_path: FilterConfig::default_path(),
            option: EncodeOption::default(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(anyhow::anyhow!("At least one input path is required"));
        }

        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "Output path is not a directory: {}",
                self.output_dir.display()
            ));
        }

        self.option.validate()
    }
}

/// Extension allow-list persisted as YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub exts: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exts: DEFAULT_EXTS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl FilterConfig {
    /// `<config_dir>/media-compressor/filter.yaml`, or `config/filter.yaml` when
    /// the platform has no config dir
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("media-compressor"))
            .unwrap_or_else(|| PathBuf::from("config"))
            .join("filter.yaml")
    }

    /// Load the allow-list, writing the default one first if the file is missing
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to_file(path).await?;
            info!("Created default extension filter: {}", path.display());
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: FilterConfig = serde_yaml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid filter file {}: {}", path.display(), e))?;
        debug!("Loaded {} extensions from {}", config.exts.len(), path.display());
        Ok(config.normalized())
    }

    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_yaml::to_string(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Lowercase, leading dot, no blanks
    pub fn normalized(self) -> Self {
        let exts = self
            .exts
            .into_iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
            .collect();
        Self { exts }
    }

    /// Case-insensitive extension check
    pub fn accepts(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
                self.exts.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_option_validation() {
        let mut option = EncodeOption::default();
        assert!(option.validate().is_ok());

        option.crf = Some(52);
        assert!(option.validate().is_err());

        option.crf = Some(30);
        option.max_height = 0;
        assert!(option.validate().is_err());

        option.max_height = 1081;
        assert!(option.validate().is_err());

        option.max_height = 1080;
        assert!(option.validate().is_ok());
    }

    #[test]
    fn test_option_default() {
        let option = EncodeOption::default();
        assert_eq!(option.max_height, 1440);
        assert_eq!(option.codec, VideoCodec::H264);
        assert!(option.remove_error_output);
        assert!(option.leave);
        assert!(!option.is_force);
        assert!(!option.is_replace);
        assert!(!option.is_size_skip);
    }

    #[test]
    fn test_codec_dependent_crf() {
        let mut option = EncodeOption::default();
        assert_eq!(option.effective_crf(), 23);

        option.codec = VideoCodec::H265;
        assert_eq!(option.effective_crf(), 28);

        option.crf = Some(18);
        assert_eq!(option.effective_crf(), 18);
    }

    #[test]
    fn test_clone_is_independent() {
        let template = EncodeOption::default();
        let mut per_file = template.clone();
        per_file.is_force = true;
        assert!(!template.is_force);
    }

    #[test]
    fn test_filter_accepts_case_insensitive() {
        let filter = FilterConfig::default();
        assert!(filter.accepts(Path::new("/a/clip.MP4")));
        assert!(filter.accepts(Path::new("song.flac")));
        assert!(!filter.accepts(Path::new("notes.txt")));
        assert!(!filter.accepts(Path::new("no_extension")));
    }

    #[test]
    fn test_filter_normalization() {
        let filter = FilterConfig {
            exts: vec!["MKV".to_string(), " .Mp3 ".to_string(), "".to_string()],
        }
        .normalized();
        assert_eq!(filter.exts, vec![".mkv", ".mp3"]);
    }

    #[tokio::test]
    async fn test_filter_created_then_reloaded() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join("filter.yaml");

        let created = FilterConfig::load_or_create(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(created.exts.len(), DEFAULT_EXTS.len());

        tokio::fs::write(&path, "exts:\n  - .MKV\n  - avi\n").await.unwrap();
        let loaded = FilterConfig::load_or_create(&path).await.unwrap();
        assert_eq!(loaded.exts, vec![".mkv", ".avi"]);
    }

    #[test]
    fn test_batch_requires_inputs() {
        let config = BatchConfig::default();
        assert!(config.validate().is_err());

        let config = BatchConfig {
            inputs: vec![PathBuf::from("movie.mkv")],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
