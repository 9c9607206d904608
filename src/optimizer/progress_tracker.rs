//! # Progress Tracking Module
//!
//! Unifica barra del batch e statistiche in un singolo tracker.
//! Il batch è sequenziale: niente lock, solo `&mut self`.

use crate::logging::FILE_ONLY;
use crate::model::FileTaskStatus;
use crate::optimizer::placement::PlacementResult;
use crate::optimizer::task_encoder::{TaskOutcome, TaskReport};
use crate::progress::{BatchStats, ProgressManager};
use std::path::Path;
use tracing::{error, info, warn};

/// Tracker progress del batch
pub struct ProgressTracker {
    pub total_files: usize,
    stats: BatchStats,
    progress_manager: ProgressManager,
}

impl ProgressTracker {
    /// Crea un nuovo tracker; la barra è visibile solo se richiesta
    pub fn new(total_files: usize, show_bar: bool) -> Self {
        let progress_manager = if show_bar {
            ProgressManager::new(total_files as u64)
        } else {
            ProgressManager::hidden()
        };

        Self {
            total_files,
            stats: BatchStats::new(),
            progress_manager,
        }
    }

    pub fn set_duplicates(&mut self, duplicates: usize) {
        self.stats.duplicates = duplicates;
    }

    /// Mostra il file in lavorazione
    pub fn start_file(&self, file_path: &Path) {
        self.progress_manager.set_message(&Self::file_name(file_path));
    }

    fn file_name(file_path: &Path) -> String {
        file_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    /// Aggiorna statistiche e barra per un file terminato.
    ///
    /// Returns the terminal status, if the file got one.
    pub fn handle_file_completion(&mut self, file_path: &Path, outcome: &TaskOutcome) -> Option<FileTaskStatus> {
        let name = Self::file_name(file_path);
        match outcome {
            TaskOutcome::NotStarted => {
                self.stats.record(FileTaskStatus::Skipped);
                self.progress_manager.update(&format!("[SKIP] {}: output exists", name));
                None
            }
            TaskOutcome::Failed(e) => {
                error!("[ERROR] {}: {:#}", file_path.display(), e);
                self.stats.add_error();
                self.progress_manager.update(&format!("[ERROR] {}", name));
                None
            }
            TaskOutcome::Finished(report) => {
                self.record_report(report);
                self.progress_manager
                    .update(&format!("[{}] {}", report.status, name));
                Some(report.status)
            }
        }
    }

    fn record_report(&mut self, report: &TaskReport) {
        self.stats.record(report.status);
        if let PlacementResult::Replaced {
            original_size,
            new_size,
            ..
        } = report.placement
        {
            self.stats.add_replaced(original_size, new_size);
        }

        let output = report
            .output
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        match report.status {
            FileTaskStatus::Error => error!(
                "Processing failed\nState: {}\nInput: {}\nOutput: {}",
                report.status,
                report.input.display(),
                output
            ),
            FileTaskStatus::Suspend | FileTaskStatus::Pass => warn!(
                "State: {} | Input: {} | Output: {}",
                report.status,
                report.input.display(),
                output
            ),
            _ => info!(
                target: FILE_ONLY,
                "Done | State: {} | Input: {} | Output: {} | Placement: {:?}",
                report.status,
                report.input.display(),
                output,
                report.placement
            ),
        }
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Finalizza la barra con il riepilogo e restituisce le statistiche
    pub fn finish(self) -> BatchStats {
        let summary = self.stats.format_summary();
        self.progress_manager.finish(&summary);
        info!("{}", summary);
        self.stats
    }
}
