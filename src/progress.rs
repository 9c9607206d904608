//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche del batch.
//!
//! ## Responsabilità:
//! - Progress bar del batch con `indicatif` (un passo per file)
//! - Progress bar per-file guidata dal canale `-progress` di ffmpeg
//! - Conteggio degli stati terminali e dei byte risparmiati
//! - Report finale con statistiche aggregate
//!
//! ## Componenti principali:
//! - `ProgressManager`: barra del batch e factory delle barre per-file
//! - `BatchStats`: statistiche cumulative per stato terminale
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [========================>---------------] 12/20 (60%) clip.mp4
//! ```

use crate::file_manager::FileManager;
use crate::model::FileTaskStatus;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Ticks of a per-file bar per second of media
pub const FILE_BAR_SCALE: f64 = 1000.0;

/// Manages progress reporting for one batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Hidden manager, used when progress display is off
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without incrementing
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Per-file bar measured in media time.
    ///
    /// With an unknown duration the bar degrades to a spinner.
    pub fn file_bar(name: &str, duration_secs: Option<f64>) -> ProgressBar {
        let bar = match duration_secs {
            Some(duration) if duration > 0.0 => {
                let bar = ProgressBar::new((duration * FILE_BAR_SCALE) as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} {prefix} [{bar:30.cyan/blue}] {percent}% [{elapsed_precise}<{eta}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                bar
            }
            _ => Self::spinner(""),
        };
        bar.set_prefix(name.to_string());
        bar
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {prefix} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// Counters for one batch run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub files_processed: usize,
    pub success: usize,
    pub skipped: usize,
    pub passed: usize,
    pub errors: usize,
    pub suspended: usize,
    /// Files dropped by deduplication
    pub duplicates: usize,
    /// Originals replaced by a smaller output
    pub replaced: usize,
    pub total_original_size: u64,
    pub total_bytes_saved: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, status: FileTaskStatus) {
        self.files_processed += 1;
        match status {
            FileTaskStatus::Success => self.success += 1,
            FileTaskStatus::Skipped => self.skipped += 1,
            FileTaskStatus::Pass => self.passed += 1,
            FileTaskStatus::Suspend => self.suspended += 1,
            FileTaskStatus::Error | FileTaskStatus::Init | FileTaskStatus::Waiting | FileTaskStatus::Processing => {
                self.errors += 1
            }
        }
    }

    /// A failure that happened before any encode status existed
    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    pub fn add_replaced(&mut self, original_size: u64, new_size: u64) {
        self.replaced += 1;
        self.total_original_size += original_size;
        self.total_bytes_saved += original_size.saturating_sub(new_size);
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Success: {} | Skipped: {} | Pass: {} | Errors: {} | Suspended: {} | Duplicates: {} | Replaced: {} | Total saved: {} ({:.2}%)",
            self.files_processed,
            self.success,
            self.skipped,
            self.passed,
            self.errors,
            self.suspended,
            self.duplicates,
            self.replaced,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}
