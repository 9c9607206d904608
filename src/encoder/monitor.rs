//! Session monitor: turns progress events into a progress bar, keeps the
//! tail of the diagnostics and fires the size-skip abort.

use super::progress_stream::ProgressEvent;
use crate::progress::FILE_BAR_SCALE;
use crate::utils::format_si_size;
use indicatif::ProgressBar;
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Output may exceed the input by this much before size-skip fires
pub const SIZE_SKIP_MARGIN: u64 = 10 * 1024 * 1024;

/// Diagnostic lines kept for the error report
pub const DIAGNOSTIC_TAIL: usize = 256;

/// Latest values seen on the progress channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub total_size: Option<u64>,
    pub bitrate: Option<String>,
    pub time: Option<String>,
    pub speed: Option<String>,
    pub dup_frames: Option<String>,
    pub drop_frames: Option<String>,
    pub out_time_secs: Option<f64>,
    pub ended: bool,
}

impl ProgressSnapshot {
    /// Apply one `key=value` field; returns true when the display changed
    pub fn apply(&mut self, key: &str, value: &str) -> bool {
        let non_zero = |v: &str| (v != "0").then(|| v.to_string());
        match key {
            "total_size" => self.total_size = value.parse().ok(),
            "bitrate" => self.bitrate = Some(value.to_string()),
            "out_time" => {
                self.time = Some(value.split('.').next().unwrap_or(value).to_string())
            }
            "speed" => self.speed = Some(value.to_string()),
            "dup_frames" => self.dup_frames = non_zero(value),
            "drop_frames" => self.drop_frames = non_zero(value),
            // microseconds, despite the name
            "out_time_ms" | "out_time_us" => {
                self.out_time_secs = value.parse::<f64>().ok().map(|us| us / 1_000_000.0)
            }
            "progress" => self.ended = value == "end",
            _ => return false,
        }
        true
    }

    /// `size=.. br=.. time=.. spd=..` postfix for the bar
    pub fn postfix(&self) -> String {
        let mut parts = Vec::new();
        if let Some(size) = self.total_size {
            parts.push(format!("size={}", format_si_size(size)));
        }
        let text = [
            ("br", &self.bitrate),
            ("time", &self.time),
            ("spd", &self.speed),
            ("dup_f", &self.dup_frames),
            ("drop_f", &self.drop_frames),
        ];
        for (label, value) in text {
            if let Some(value) = value {
                parts.push(format!("{}={}", label, value));
            }
        }
        parts.join(" ")
    }
}

/// What the monitor saw once the stream ended
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub diagnostics: Vec<String>,
    pub snapshot: ProgressSnapshot,
    pub size_skip_fired: bool,
}

pub struct Monitor {
    bar: Option<ProgressBar>,
    leave: bool,
    size_limit: Option<u64>,
    abort: Option<oneshot::Sender<()>>,
    diagnostics: VecDeque<String>,
    snapshot: ProgressSnapshot,
    size_skip_fired: bool,
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            bar: None,
            leave: true,
            size_limit: None,
            abort: None,
            diagnostics: VecDeque::with_capacity(DIAGNOSTIC_TAIL),
            snapshot: ProgressSnapshot::default(),
            size_skip_fired: false,
        }
    }

    pub fn with_bar(mut self, bar: ProgressBar, leave: bool) -> Self {
        self.bar = Some(bar);
        self.leave = leave;
        self
    }

    /// Abort through `abort` once the output passes `input_size + SIZE_SKIP_MARGIN`
    pub fn with_size_skip(mut self, input_size: u64, abort: oneshot::Sender<()>) -> Self {
        self.size_limit = Some(input_size.saturating_add(SIZE_SKIP_MARGIN));
        self.abort = Some(abort);
        self
    }

    fn push_diagnostic(&mut self, line: String) {
        if self.diagnostics.len() == DIAGNOSTIC_TAIL {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(line);
    }

    fn check_size_skip(&mut self) {
        let (Some(limit), Some(size)) = (self.size_limit, self.snapshot.total_size) else {
            return;
        };
        if size > limit {
            if let Some(abort) = self.abort.take() {
                warn!(
                    "Output reached {} (limit {}), abandoning encode",
                    format_si_size(size),
                    format_si_size(limit)
                );
                self.size_skip_fired = true;
                let _ = abort.send(());
            }
        }
    }

    fn refresh_bar(&self) {
        let Some(bar) = &self.bar else { return };
        if let Some(secs) = self.snapshot.out_time_secs {
            if bar.length().is_some() {
                bar.set_position((secs.max(0.0) * FILE_BAR_SCALE) as u64);
            }
        }
        bar.set_message(self.snapshot.postfix());
        if self.snapshot.ended {
            if let Some(len) = bar.length() {
                bar.set_position(len);
            }
        }
    }

    fn close_bar(&self) {
        let Some(bar) = &self.bar else { return };
        if bar.is_finished() {
            return;
        }
        if self.leave {
            bar.abandon();
        } else {
            bar.finish_and_clear();
        }
    }

    /// Consume events until `End` (or the channel closes)
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ProgressEvent>) -> MonitorReport {
        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::Diagnostic(line) => self.push_diagnostic(line),
                ProgressEvent::Field { key, value } => {
                    if self.snapshot.apply(&key, &value) {
                        self.check_size_skip();
                        self.refresh_bar();
                    }
                }
                ProgressEvent::End => break,
            }
        }
        debug!("Progress stream closed: {}", self.snapshot.postfix());
        self.close_bar();

        MonitorReport {
            diagnostics: self.diagnostics.into_iter().collect(),
            snapshot: self.snapshot,
            size_skip_fired: self.size_skip_fired,
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}
