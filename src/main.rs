//! # Media Compressor - Main Entry Point
//!
//! Punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging tramite `LogConfig`
//! - Creazione della configurazione batch e avvio del compressore
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, output, codec, crf, etc.)
//! 2. Configura il logging (livello, destinazioni, directory)
//! 3. Costruisce `BatchConfig` ed `EncodeOption`
//! 4. Registra le sorgenti di controllo (Ctrl-C, SIGUSR1)
//! 5. Istanzia `MediaCompressor` e avvia il batch
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-compressor -i ~/Videos -i extra.list -o out --replace --size-skip --progress
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};

use media_compressor::logging::{self, LogConfig, LogMode};
use media_compressor::platform::PlatformCommands;
use media_compressor::{
    BatchConfig, ControlHub, EncodeOption, ExistsMode, FilterConfig, MediaCompressor, SortMode,
    VideoCodec,
};

#[derive(Parser)]
#[command(name = "media-compressor")]
#[command(version)]
#[command(about = "Batch-compress videos and audio with ffmpeg, skipping already processed files")]
struct Args {
    /// Input file, directory or .list file (repeatable)
    #[arg(short, long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// What to do when the output file already exists
    #[arg(short, long, value_enum, default_value_t = ExistsMode::Numbering)]
    exists_mode: ExistsMode,

    /// Re-encode files that already carry the processing marker
    #[arg(short, long)]
    force: bool,

    /// Replace the original when the output is smaller
    #[arg(short, long)]
    replace: bool,

    /// Keep the partial output when ffmpeg fails
    #[arg(short, long)]
    save_error_output: bool,

    /// Abort an encode once the output grows past the input size
    #[arg(long)]
    size_skip: bool,

    /// Video codec
    #[arg(long, value_enum, default_value_t = VideoCodec::H264)]
    codec: VideoCodec,

    /// CRF value (0-51); defaults to 23 for h264, 28 for h265
    #[arg(long)]
    crf: Option<u8>,

    /// Maximum output height
    #[arg(long, default_value = "1440")]
    height: u32,

    /// Decode with CUDA
    #[arg(long)]
    cuda: bool,

    /// Only list the files that would be processed
    #[arg(long)]
    scan: bool,

    /// Processing order by input size
    #[arg(long, value_enum, default_value_t = SortMode::None)]
    sort: SortMode,

    /// Extension filter file (YAML)
    #[arg(long)]
    filter: Option<PathBuf>,

    /// Show progress bars
    #[arg(long)]
    progress: bool,

    /// Clear per-file progress bars once finished
    #[arg(long)]
    no_leave: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log destinations
    #[arg(long, value_enum, default_value_t = LogMode::ConsoleFile)]
    log_mode: LogMode,

    /// Log file directory
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

impl Args {
    fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            mode: self.log_mode,
            dir: self.log_dir.clone(),
        }
    }

    fn into_batch_config(self) -> BatchConfig {
        let option = EncodeOption {
            max_height: self.height,
            is_force: self.force,
            codec: self.codec,
            crf: self.crf,
            remove_error_output: !self.save_error_output,
            use_progressbar: self.progress,
            leave: !self.no_leave,
            is_cuda: self.cuda,
            is_replace: self.replace,
            is_size_skip: self.size_skip,
        };

        BatchConfig {
            inputs: self.inputs,
            output_dir: self.output,
            exists_mode: self.exists_mode,
            sort_mode: self.sort,
            scan_only: self.scan,
            filter_path: self.filter.unwrap_or_else(FilterConfig::default_path),
            option,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_config())?;
    info!(
        "media-compressor v{} on {}",
        env!("CARGO_PKG_VERSION"),
        PlatformCommands::system_info()
    );

    let config = args.into_batch_config();
    let mut control = ControlHub::with_default_sources();
    let mut compressor = MediaCompressor::new(config).await?;
    compressor.run(&mut control).await?;

    Ok(())
}
