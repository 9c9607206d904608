//! # Encode Session
//!
//! Esegue ffmpeg per un singolo file e ne mappa l'esito su uno stato terminale.
//!
//! ## Macchina a stati:
//! ```text
//! INIT -> WAITING -> PROCESSING -> SUCCESS | ERROR | SUSPEND | PASS
//!    \-> SKIPPED (marker già presente, nessun processo)
//! ```
//!
//! ## Responsabilità:
//! - Probe del file e costruzione degli argomenti (`args_builder`)
//! - Avvio di ffmpeg a priorità ridotta
//! - Monitor concorrente del progress stream (barra, size-skip)
//! - Segnali di controllo: cancel (SUSPEND) e pausa/ripresa
//! - Permessi dell'output e pulizia degli output parziali

pub mod args_builder;
pub mod control;
pub mod monitor;
pub mod progress_stream;

use crate::config::EncodeOption;
use crate::error::CompressError;
use crate::model::{FFmpegArgs, FileInfo, FileTaskStatus};
use crate::platform::{self, PlatformCommands, ToolCommand};
use crate::progress::ProgressManager;
use anyhow::Result;
use control::{ControlHub, ControlSignal};
use monitor::{Monitor, MonitorReport};
use progress_stream::ProgressStream;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// How long the progress tasks may outlive the encoder before being aborted
const STREAM_GRACE: Duration = Duration::from_secs(3);

/// Diagnostic lines echoed in the error log
const ERROR_CONTEXT_LINES: usize = 20;

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    SizeSkip,
    Cancelled,
}

/// Runs encode sessions against one ffmpeg/ffprobe pair
#[derive(Debug, Clone)]
pub struct Encoder {
    ffmpeg: ToolCommand,
    ffprobe: ToolCommand,
    aac_encoder: &'static str,
}

impl Encoder {
    /// Detects the preferred AAC encoder (once per process)
    pub async fn new(ffmpeg: ToolCommand, ffprobe: ToolCommand) -> Self {
        let aac_encoder = platform::preferred_aac_encoder(&ffmpeg).await;
        Self::with_aac_encoder(ffmpeg, ffprobe, aac_encoder)
    }

    pub fn with_aac_encoder(ffmpeg: ToolCommand, ffprobe: ToolCommand, aac_encoder: &'static str) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            aac_encoder,
        }
    }

    /// Resolve ffmpeg/ffprobe and check that both answer `-version`
    pub async fn from_platform() -> Result<Self, CompressError> {
        let platform = PlatformCommands::instance();
        platform.verify_tools()?;
        let ffmpeg = platform.tool("ffmpeg")?;
        let ffprobe = platform.tool("ffprobe")?;

        for tool in [&ffmpeg, &ffprobe] {
            if !PlatformCommands::is_tool_working(tool).await {
                return Err(CompressError::MissingDependency(format!(
                    "{} is not working",
                    tool.program().display()
                )));
            }
        }

        Ok(Self::new(ffmpeg, ffprobe).await)
    }

    pub fn aac_encoder(&self) -> &'static str {
        self.aac_encoder
    }

    /// Probe `file_info` and wrap it into an encode specification
    pub async fn prepare(&self, file_info: FileInfo, option: EncodeOption) -> Result<FFmpegArgs, CompressError> {
        let args = FFmpegArgs::probe_file(&self.ffprobe, file_info, option).await?;

        let (_, ignored) = args.partition_streams();
        for stream in ignored {
            warn!(
                "Ignoring stream #{} ({} {}) of {}",
                stream.index,
                stream.codec_type.as_deref().unwrap_or("unknown"),
                stream.codec(),
                args.file_info.input_path().display()
            );
        }
        Ok(args)
    }

    /// Full argument pipeline for a regular encode
    pub async fn build_auto_args(&self, args: &mut FFmpegArgs) -> Result<()> {
        args_builder::add_auto_args(args, self.aac_encoder).await
    }

    /// Argument pipeline for a copy-only pass
    pub async fn build_copy_args(&self, args: &mut FFmpegArgs) -> Result<()> {
        args_builder::add_copy_args(args).await
    }

    /// Run one encode and return its terminal status.
    ///
    /// Expected failures (output directory, unreadable input, launch, non-zero
    /// exit) end as `ERROR`. An `Err` that is not a `CompressError` means the
    /// monitor task died and the batch should stop.
    pub async fn encode(&self, args: &mut FFmpegArgs, control: &mut ControlHub) -> Result<FileTaskStatus> {
        match args.file_info.status() {
            FileTaskStatus::Waiting => {}
            FileTaskStatus::Skipped => return Ok(FileTaskStatus::Skipped),
            other => {
                error!(
                    "Cannot dispatch {} in status {}",
                    args.file_info.input_path().display(),
                    other
                );
                return Err(CompressError::InvalidStatus(other.to_string()).into());
            }
        }

        let output = args.file_info.require_output_path()?.to_path_buf();
        if let Some(parent) = output.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("Cannot create output directory {}: {}", parent.display(), e);
                return Ok(self.finish(args, FileTaskStatus::Error).await);
            }
        }

        let option = args.option().clone();
        let size_limit = if option.is_size_skip && !args.is_stream_copy() && !args.is_only_audio() {
            match args.file_info.input_size().await {
                Ok(size) => Some(size),
                Err(e) => {
                    error!(
                        "Cannot read input {}: {:#}",
                        args.file_info.input_path().display(),
                        e
                    );
                    return Ok(self.finish(args, FileTaskStatus::Error).await);
                }
            }
        } else {
            None
        };
        let with_progress = option.use_progressbar || option.is_size_skip;
        let command_args = args.command_args(with_progress)?;
        debug!("{}", args.summary());
        info!("Encoding: {}", self.ffmpeg.render(&command_args));

        let spawned = self
            .ffmpeg
            .command()
            .args(&command_args)
            .stdin(Stdio::null())
            .stdout(if with_progress { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch {}: {}", self.ffmpeg.program().display(), e);
                return Ok(self.finish(args, FileTaskStatus::Error).await);
            }
        };

        args.file_info.set_status(FileTaskStatus::Processing);
        let pid = child.id();
        if let Some(pid) = pid {
            platform::set_low_priority(pid).await;
        }

        let (stream, events) = ProgressStream::attach(child.stdout.take(), child.stderr.take());

        let mut monitor = Monitor::new();
        if option.use_progressbar {
            let name = args
                .file_info
                .input_path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            monitor = monitor.with_bar(
                ProgressManager::file_bar(&name, args.probe().duration_secs()),
                option.leave,
            );
        }
        let mut size_skip = None;
        if let Some(limit) = size_limit {
            let (abort_tx, abort_rx) = oneshot::channel();
            monitor = monitor.with_size_skip(limit, abort_tx);
            size_skip = Some(abort_rx);
        }
        let mut monitor_task = tokio::spawn(monitor.run(events));

        let outcome = Self::supervise(&mut child, pid, &mut size_skip, control).await;

        let joined = match tokio::time::timeout(STREAM_GRACE, &mut monitor_task).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!("Progress stream still open after exit, aborting readers");
                stream.abort();
                monitor_task.await
            }
        };
        stream.join().await;
        let report = joined.map_err(|e| anyhow::anyhow!("Progress monitor failed: {}", e))?;

        let status = self.classify(args, outcome, &report, control, &command_args);
        Ok(self.finish(args, status).await)
    }

    async fn supervise(
        child: &mut Child,
        pid: Option<u32>,
        size_skip: &mut Option<oneshot::Receiver<()>>,
        control: &mut ControlHub,
    ) -> Outcome {
        let mut paused = false;
        loop {
            tokio::select! {
                exit = child.wait() => return Outcome::Exited(exit),
                _ = Self::size_skip_fired(size_skip) => {
                    Self::resume_if_paused(pid, paused);
                    if let Err(e) = child.kill().await {
                        debug!("Kill after size-skip failed: {}", e);
                    }
                    return Outcome::SizeSkip;
                }
                signal = control.recv() => match signal {
                    ControlSignal::Cancel => {
                        Self::resume_if_paused(pid, paused);
                        if let Err(e) = child.kill().await {
                            debug!("Kill after cancel failed: {}", e);
                        }
                        return Outcome::Cancelled;
                    }
                    ControlSignal::TogglePause => {
                        let Some(pid) = pid else { continue };
                        let result = if paused {
                            platform::resume_process(pid)
                        } else {
                            platform::suspend_process(pid)
                        };
                        match result {
                            Ok(()) => {
                                paused = !paused;
                                info!("{}", if paused { "Encoding paused" } else { "Encoding resumed" });
                            }
                            Err(e) => warn!("Pause toggle failed: {}", e),
                        }
                    }
                },
            }
        }
    }

    /// Resolves once size-skip fires; pending forever otherwise
    async fn size_skip_fired(rx: &mut Option<oneshot::Receiver<()>>) {
        if let Some(inner) = rx.as_mut() {
            if inner.await.is_ok() {
                return;
            }
        }
        *rx = None;
        std::future::pending::<()>().await
    }

    fn resume_if_paused(pid: Option<u32>, paused: bool) {
        if let (true, Some(pid)) = (paused, pid) {
            let _ = platform::resume_process(pid);
        }
    }

    fn classify(
        &self,
        args: &FFmpegArgs,
        outcome: Outcome,
        report: &MonitorReport,
        control: &mut ControlHub,
        command_args: &[String],
    ) -> FileTaskStatus {
        let input = args.file_info.input_path().display();
        match outcome {
            Outcome::Exited(Ok(exit)) if exit.success() => FileTaskStatus::Success,
            Outcome::SizeSkip => {
                warn!("[PASS] Output outgrew the input, encode abandoned: {}", input);
                FileTaskStatus::Pass
            }
            // the limit tripped but ffmpeg exited on its own before the kill
            Outcome::Exited(Ok(_)) if report.size_skip_fired => {
                warn!("[PASS] Output outgrew the input before ffmpeg exited: {}", input);
                FileTaskStatus::Pass
            }
            Outcome::Cancelled => {
                warn!("[SUSPEND] Encode cancelled by user: {}", input);
                FileTaskStatus::Suspend
            }
            // ffmpeg shares the terminal and may die from the same interrupt first
            Outcome::Exited(Ok(_)) if control.is_cancelled() => {
                warn!("[SUSPEND] Encode interrupted: {}", input);
                FileTaskStatus::Suspend
            }
            Outcome::Exited(result) => {
                let reason = match result {
                    Ok(exit) => format!("exited with {}", exit),
                    Err(e) => format!("wait failed: {}", e),
                };
                let tail_start = report.diagnostics.len().saturating_sub(ERROR_CONTEXT_LINES);
                error!(
                    "[ERROR] ffmpeg {} for {}\ncommand: {}\n{}",
                    reason,
                    input,
                    self.ffmpeg.render(command_args),
                    report.diagnostics[tail_start..].join("\n")
                );
                FileTaskStatus::Error
            }
        }
    }

    /// Permissions, error-output cleanup and the final status
    async fn finish(&self, args: &mut FFmpegArgs, status: FileTaskStatus) -> FileTaskStatus {
        if let Some(output) = args.file_info.output_path().map(|p| p.to_path_buf()) {
            platform::set_file_permission(&output).await;

            let failed = matches!(status, FileTaskStatus::Error | FileTaskStatus::Suspend);
            if failed && args.option().remove_error_output && output.is_file() {
                match tokio::fs::remove_file(&output).await {
                    Ok(()) => debug!("Removed partial output {}", output.display()),
                    Err(e) => warn!("Failed to remove partial output {}: {}", output.display(), e),
                }
            }
        }

        args.file_info.set_status(status);
        status
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::model::ffmpeg_args::tests::make_args;
    use crate::model::probe::tests::VIDEO_PROBE;
    use crate::platform::NATIVE_AAC;
    use tempfile::TempDir;

    /// Fake ffmpeg: runs `body` with the real arguments as `$@`; the last
    /// argument is the output file
    pub(crate) fn fake_ffmpeg(body: &str) -> ToolCommand {
        ToolCommand::new("sh").with_prefix_args(["-c", body, "ffmpeg"])
    }

    pub(crate) const WRITE_OUTPUT: &str = r#"for last; do :; done; printf 'encoded' > "$last""#;

    fn encoder(body: &str) -> Encoder {
        Encoder::with_aac_encoder(fake_ffmpeg(body), fake_ffmpeg("exit 1"), NATIVE_AAC)
    }

    async fn run(
        encoder: &Encoder,
        args: &mut FFmpegArgs,
        control: &mut ControlHub,
    ) -> FileTaskStatus {
        tokio::time::timeout(Duration::from_secs(10), encoder.encode(args, control))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_writes_output() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let encoder = encoder(WRITE_OUTPUT);
        encoder.build_auto_args(&mut args).await.unwrap();

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;

        assert_eq!(status, FileTaskStatus::Success);
        assert_eq!(args.file_info.status(), FileTaskStatus::Success);
        let output = args.file_info.output_path().unwrap();
        assert_eq!(std::fs::read(output).unwrap(), b"encoded");
    }

    #[tokio::test]
    async fn test_error_removes_partial_output() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let encoder = encoder(&format!("{}; echo 'Invalid data' >&2; exit 1", WRITE_OUTPUT));
        encoder.build_auto_args(&mut args).await.unwrap();

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;

        assert_eq!(status, FileTaskStatus::Error);
        assert!(!args.file_info.output_exists());
    }

    #[tokio::test]
    async fn test_error_output_kept_when_requested() {
        let temp_dir = TempDir::new().unwrap();
        let option = EncodeOption {
            remove_error_output: false,
            ..Default::default()
        };
        let mut args = make_args(&temp_dir, VIDEO_PROBE, option);
        let encoder = encoder(&format!("{}; exit 3", WRITE_OUTPUT));
        encoder.build_auto_args(&mut args).await.unwrap();

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;

        assert_eq!(status, FileTaskStatus::Error);
        assert!(args.file_info.output_exists());
    }

    #[tokio::test]
    async fn test_size_skip_passes() {
        let temp_dir = TempDir::new().unwrap();
        let option = EncodeOption {
            is_size_skip: true,
            ..Default::default()
        };
        let mut args = make_args(&temp_dir, VIDEO_PROBE, option);
        let encoder = encoder("echo total_size=99999999999; echo progress=continue; exec sleep 10");
        encoder.build_auto_args(&mut args).await.unwrap();
        assert!(args.command_args(true).unwrap().contains(&"pipe:1".to_string()));

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;

        assert_eq!(status, FileTaskStatus::Pass);
    }

    #[tokio::test]
    async fn test_size_skip_wins_over_failed_exit() {
        let temp_dir = TempDir::new().unwrap();
        let option = EncodeOption {
            is_size_skip: true,
            ..Default::default()
        };
        let mut args = make_args(&temp_dir, VIDEO_PROBE, option);
        let encoder = encoder("echo total_size=99999999999; echo progress=continue; exit 1");
        encoder.build_auto_args(&mut args).await.unwrap();

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;

        assert_eq!(status, FileTaskStatus::Pass);
    }

    #[tokio::test]
    async fn test_unwritable_output_dir_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let encoder = encoder(WRITE_OUTPUT);
        encoder.build_auto_args(&mut args).await.unwrap();

        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        args.file_info.set_output_path(blocker.join("input.mp4"));

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;
        assert_eq!(status, FileTaskStatus::Error);
    }

    #[tokio::test]
    async fn test_vanished_input_with_size_skip_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let option = EncodeOption {
            is_size_skip: true,
            ..Default::default()
        };
        let mut args = make_args(&temp_dir, VIDEO_PROBE, option);
        let encoder = encoder(WRITE_OUTPUT);
        encoder.build_auto_args(&mut args).await.unwrap();
        std::fs::remove_file(args.file_info.input_path()).unwrap();

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;

        assert_eq!(status, FileTaskStatus::Error);
        assert!(!args.file_info.output_exists());
    }

    #[tokio::test]
    async fn test_cancel_suspends() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let encoder = encoder(&format!("{}; exec sleep 10", WRITE_OUTPUT));
        encoder.build_auto_args(&mut args).await.unwrap();

        let mut control = ControlHub::new();
        let sender = control.sender();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = sender.send(ControlSignal::Cancel);
        });

        let status = run(&encoder, &mut args, &mut control).await;

        assert_eq!(status, FileTaskStatus::Suspend);
        assert!(!args.file_info.output_exists());
    }

    #[tokio::test]
    async fn test_pause_does_not_change_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let encoder = encoder(&format!("sleep 0.3; {}", WRITE_OUTPUT));
        encoder.build_auto_args(&mut args).await.unwrap();

        let mut control = ControlHub::new();
        let sender = control.sender();
        sender.send(ControlSignal::TogglePause).unwrap();
        sender.send(ControlSignal::TogglePause).unwrap();

        let status = run(&encoder, &mut args, &mut control).await;
        assert_eq!(status, FileTaskStatus::Success);
    }

    #[tokio::test]
    async fn test_skipped_never_launches() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        args.file_info.set_status(FileTaskStatus::Skipped);
        let encoder = encoder(WRITE_OUTPUT);

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;

        assert_eq!(status, FileTaskStatus::Skipped);
        assert!(!args.file_info.output_exists());
    }

    #[tokio::test]
    async fn test_dispatch_requires_waiting() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let encoder = encoder(WRITE_OUTPUT);

        let err = encoder.encode(&mut args, &mut ControlHub::new()).await.unwrap_err();
        assert!(err.downcast_ref::<CompressError>().is_some());
        assert!(!args.file_info.output_exists());
    }

    #[tokio::test]
    async fn test_launch_failure_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut args = make_args(&temp_dir, VIDEO_PROBE, EncodeOption::default());
        let encoder = Encoder::with_aac_encoder(
            ToolCommand::new("/nonexistent/ffmpeg"),
            ToolCommand::new("/nonexistent/ffprobe"),
            NATIVE_AAC,
        );
        encoder.build_auto_args(&mut args).await.unwrap();

        let status = run(&encoder, &mut args, &mut ControlHub::new()).await;
        assert_eq!(status, FileTaskStatus::Error);
    }

    #[tokio::test]
    async fn test_prepare_probes_input() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("clip.mov");
        std::fs::write(&input, b"data").unwrap();
        let probe_script = format!("cat <<'EOF'\n{}\nEOF", VIDEO_PROBE);
        let encoder = Encoder::with_aac_encoder(fake_ffmpeg("exit 0"), fake_ffmpeg(&probe_script), NATIVE_AAC);

        let args = encoder
            .prepare(FileInfo::new(&input).unwrap(), EncodeOption::default())
            .await
            .unwrap();
        assert_eq!(args.video_stream().map(|s| s.index), Some(0));
    }
}
