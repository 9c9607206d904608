//! # Media Compressor Main Orchestrator
//!
//! Orchestratore del batch: scoperta dei file, deduplicazione, ordinamento
//! ed elaborazione sequenziale delegata a `TaskEncoder`.
//!
//! Un SUSPEND interrompe l'intero batch; ogni altro esito passa al file successivo.

use crate::config::{BatchConfig, FilterConfig, SortMode};
use crate::dedup::{self, ScanReport, SourceFile};
use crate::encoder::control::ControlHub;
use crate::encoder::Encoder;
use crate::file_manager::FileManager;
use crate::logging::FILE_ONLY;
use crate::model::FileTaskStatus;
use crate::optimizer::progress_tracker::ProgressTracker;
use crate::optimizer::task_encoder::TaskEncoder;
use crate::progress::BatchStats;
use anyhow::Result;
use tracing::{debug, info, warn};

/// Orchestratore principale del batch
pub struct MediaCompressor {
    config: BatchConfig,
    filter: FilterConfig,
    encoder: Option<Encoder>,
}

impl MediaCompressor {
    /// Valida la configurazione e carica (o crea) il filtro estensioni
    pub async fn new(config: BatchConfig) -> Result<Self> {
        config.validate()?;
        let filter = FilterConfig::load_or_create(&config.filter_path).await?;
        info!("Extension filter loaded: {} extension(s)", filter.exts.len());

        Ok(Self {
            config,
            filter,
            encoder: None,
        })
    }

    /// Usa un encoder già pronto invece di risolvere ffmpeg/ffprobe
    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Discovery + deduplication of every input
    pub async fn scan(&self, control: &mut ControlHub) -> ScanReport {
        dedup::scan_sources(&self.config.inputs, Some(&self.filter), control).await
    }

    /// Esegue il batch completo
    pub async fn run(&mut self, control: &mut ControlHub) -> Result<BatchStats> {
        let start_time = std::time::Instant::now();
        let report = self.scan(control).await;
        if report.interrupted {
            warn!("Cancelled during discovery, nothing encoded");
            let mut stats = BatchStats::new();
            stats.duplicates = report.duplicate_count;
            return Ok(stats);
        }

        if self.config.scan_only {
            Self::log_scan(&report);
            let mut stats = BatchStats::new();
            stats.duplicates = report.duplicate_count;
            return Ok(stats);
        }

        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => Encoder::from_platform().await?,
        };
        debug!("AAC encoder: {}", encoder.aac_encoder());

        self.log_configuration(&report);
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create output directory {}: {}",
                    self.config.output_dir.display(),
                    e
                )
            })?;

        let files = Self::sorted(report.files, self.config.sort_mode);
        let mut tracker = ProgressTracker::new(files.len(), self.config.option.use_progressbar);
        tracker.set_duplicates(report.duplicate_count);

        let result = self.process_files(&encoder, &files, &mut tracker, control).await;
        self.encoder = Some(encoder);
        result?;

        let stats = tracker.finish();
        info!("Batch finished in {:.1}s", start_time.elapsed().as_secs_f64());
        Ok(stats)
    }

    async fn process_files(
        &self,
        encoder: &Encoder,
        files: &[SourceFile],
        tracker: &mut ProgressTracker,
        control: &mut ControlHub,
    ) -> Result<()> {
        let task = TaskEncoder::new(encoder, &self.config);

        for (index, source) in files.iter().enumerate() {
            if control.is_cancelled() {
                warn!("Cancelled, {} file(s) left unprocessed", files.len() - index);
                break;
            }

            tracker.start_file(&source.path);
            info!(
                target: FILE_ONLY,
                "Current file ({}/{}): {} [{}]",
                index + 1,
                files.len(),
                source.path.display(),
                FileManager::format_size(source.size)
            );

            let outcome = task.process(source, control).await?;
            if tracker.handle_file_completion(&source.path, &outcome) == Some(FileTaskStatus::Suspend) {
                warn!(
                    "Batch suspended, {} file(s) left unprocessed",
                    files.len() - index - 1
                );
                break;
            }
        }
        Ok(())
    }

    /// Stable size ordering; `None` keeps discovery order
    pub fn sorted(mut files: Vec<SourceFile>, mode: SortMode) -> Vec<SourceFile> {
        match mode {
            SortMode::Ascending => files.sort_by_key(|f| f.size),
            SortMode::Descending => files.sort_by(|a, b| b.size.cmp(&a.size)),
            SortMode::None => {}
        }
        files
    }

    fn log_scan(report: &ScanReport) {
        for (target, files) in report.by_target() {
            info!("{} ({} file(s))", target.display(), files.len());
            for file in files {
                info!("  • {} [{}]", file.path.display(), FileManager::format_size(file.size));
            }
        }
        info!(
            "Detected: {} | Unique: {} | Duplicates: {}",
            report.file_count() + report.duplicate_count,
            report.file_count(),
            report.duplicate_count
        );
    }

    fn log_configuration(&self, report: &ScanReport) {
        let option = &self.config.option;
        info!("Output directory: {}", self.config.output_dir.display());
        info!(
            "Video: {} CRF {} (max height {}){}",
            option.codec.encoder_name(),
            option.effective_crf(),
            option.max_height,
            if option.is_cuda { ", CUDA decode" } else { "" }
        );
        info!("Existing outputs: {:?}", self.config.exists_mode);
        if option.is_replace {
            info!("Mode: Replace originals when the output is smaller");
        }
        if option.is_size_skip {
            info!("Size-skip enabled");
        }
        if option.is_force {
            info!("Force: re-encoding already processed files");
        }
        info!("Found {} media files to process", report.file_count());
    }
}
