//! # Task Encoder Module
//!
//! Worker per la compressione di un singolo file.
//! Separato dall'orchestratore principale per maggiore modularità.
//!
//! Le fasi hanno semantiche d'errore diverse:
//! - `prepare`: errori attesi (file illeggibile, probe fallito), il file viene saltato
//! - `run`: solo gli errori `CompressError` sono per-file; il resto ferma il batch
//! - `place`: errori registrati, lo stato dell'encoding resta invariato

use crate::config::{BatchConfig, ExistsMode};
use crate::dedup::SourceFile;
use crate::encoder::control::ControlHub;
use crate::encoder::Encoder;
use crate::error::CompressError;
use crate::model::{FFmpegArgs, FileInfo, FileTaskStatus};
use crate::optimizer::path_resolver::PathResolver;
use crate::optimizer::placement::{Placement, PlacementResult};
use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// What happened to one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: FileTaskStatus,
    pub placement: PlacementResult,
}

/// Result of [`TaskEncoder::process`]
#[derive(Debug)]
pub enum TaskOutcome {
    /// Skipped by the collision policy before probing finished
    NotStarted,
    /// Expected per-file failure; the batch goes on
    Failed(anyhow::Error),
    Finished(TaskReport),
}

/// Worker per elaborazione singoli file
pub struct TaskEncoder<'a> {
    encoder: &'a Encoder,
    config: &'a BatchConfig,
}

impl<'a> TaskEncoder<'a> {
    pub fn new(encoder: &'a Encoder, config: &'a BatchConfig) -> Self {
        Self { encoder, config }
    }

    /// Probe, resolve the output path and build the arguments.
    ///
    /// `None` when the collision policy skips the file.
    pub async fn prepare(&self, source: &SourceFile) -> Result<Option<FFmpegArgs>> {
        let file_info = FileInfo::from_source(source)?;
        let mut args = self
            .encoder
            .prepare(file_info, self.config.option.clone())
            .await?;

        let output = PathResolver::get_output_path(
            &source.path,
            &self.config.output_dir,
            args.expected_ext(),
        )?;
        let Some(output) = PathResolver::resolve_collision(output, self.config.exists_mode) else {
            info!("[SKIP] Output already exists for {}", source.path.display());
            return Ok(None);
        };
        if self.config.exists_mode == ExistsMode::Overwrite && output.is_file() {
            debug!("Overwriting {}", output.display());
        }

        args.file_info.set_output_path(output);
        self.encoder.build_auto_args(&mut args).await?;
        Ok(Some(args))
    }

    /// Run the encode session
    pub async fn run(&self, args: &mut FFmpegArgs, control: &mut ControlHub) -> Result<FileTaskStatus> {
        self.encoder.encode(args, control).await
    }

    /// Apply the placement rules
    pub async fn place(&self, args: &mut FFmpegArgs, control: &mut ControlHub) -> Result<PlacementResult> {
        Placement::new(self.encoder).apply(args, control).await
    }

    /// All three phases for one file.
    ///
    /// `Err` only for failures that should stop the whole batch.
    pub async fn process(&self, source: &SourceFile, control: &mut ControlHub) -> Result<TaskOutcome> {
        let mut args = match self.prepare(source).await {
            Ok(Some(args)) => args,
            Ok(None) => return Ok(TaskOutcome::NotStarted),
            Err(e) => return Ok(TaskOutcome::Failed(e)),
        };

        let status = match self.run(&mut args, control).await {
            Ok(status) => status,
            Err(e) if e.downcast_ref::<CompressError>().is_some() => {
                return Ok(TaskOutcome::Failed(e))
            }
            Err(e) => return Err(e),
        };

        let placement = match self.place(&mut args, control).await {
            Ok(placement) => placement,
            Err(e) => {
                error!(
                    "Placement failed for {}, original and output may both remain: {:#}",
                    source.path.display(),
                    e
                );
                PlacementResult::Failed(e.to_string())
            }
        };

        Ok(TaskOutcome::Finished(TaskReport {
            input: source.path.clone(),
            output: args.file_info.output_path().map(|p| p.to_path_buf()),
            status,
            placement,
        }))
    }
}
