//! # Platform-specific utilities
//!
//! Questo modulo centralizza la logica cross-platform per i tool esterni
//! e per il controllo dei processi figli.
//!
//! ## Responsabilità:
//! - Risoluzione di ffmpeg/ffprobe in `ToolCommand` pronti all'uso
//! - Verifica che i tool rispondano (`-version`)
//! - Rilevamento (una sola volta per processo) dell'encoder AAC preferito
//! - Priorità bassa, pausa/ripresa del processo encoder
//! - Normalizzazione dei permessi dei file di output

use crate::error::CompressError;
use crate::tool_resolver::ToolPathResolver;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Niceness applied to the encoder right after launch
pub const LOW_PRIORITY_NICE: i32 = 15;

/// Permission bits given to every produced file
pub const OUTPUT_FILE_MODE: u32 = 0o775;

pub const FDK_AAC: &str = "libfdk_aac";
pub const NATIVE_AAC: &str = "aac";
const FDK_AAC_BANNER: &str = "Encoder libfdk_aac [Fraunhofer FDK AAC]";

/// An external program plus fixed leading arguments.
///
/// The prefix lets a wrapper launcher (`nice`, `sh -c`, a container runner)
/// stand in front of the real tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    prefix_args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.prefix_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// A fresh tokio command with the prefix arguments already applied
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args);
        cmd
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Shell-like rendering used in logs
    pub fn render(&self, args: &[String]) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.prefix_args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        for arg in args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push_str(&format!("\"{}\"", arg));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Platform-specific command manager with tool resolution
pub struct PlatformCommands {
    tool_resolver: ToolPathResolver,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(|| Self {
            tool_resolver: ToolPathResolver::new(),
        })
    }

    /// Resolve a tool into a runnable command
    pub fn tool(&self, base_name: &str) -> Result<ToolCommand, CompressError> {
        self.tool_resolver
            .check_tool_with_instructions(base_name)
            .map(ToolCommand::new)
            .map_err(CompressError::MissingDependency)
    }

    /// Fail with every missing tool listed at once
    pub fn verify_tools(&self) -> Result<(), CompressError> {
        self.tool_resolver
            .verify_tools()
            .map_err(CompressError::MissingDependency)
    }

    /// Check that a tool starts and answers `-version`
    pub async fn is_tool_working(tool: &ToolCommand) -> bool {
        let result = tool
            .command()
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("Failed to run {}: {}", tool.program().display(), e);
                false
            }
        }
    }

    /// Get system information for debugging
    pub fn system_info() -> SystemInfo {
        SystemInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            family: std::env::consts::FAMILY,
        }
    }
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl std::fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.os, self.arch, self.family)
    }
}

/// Ask ffmpeg whether the Fraunhofer AAC encoder is compiled in
pub async fn detect_aac_encoder(ffmpeg: &ToolCommand) -> &'static str {
    let output = ffmpeg
        .command()
        .args(["-hide_banner", "-h", "encoder=libfdk_aac"])
        .stdin(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) if crate::utils::decode_output(&output.stdout).starts_with(FDK_AAC_BANNER) => {
            info!("libfdk_aac encoder available");
            FDK_AAC
        }
        Ok(_) => {
            debug!("libfdk_aac not available, falling back to native aac");
            NATIVE_AAC
        }
        Err(e) => {
            debug!("AAC encoder detection failed: {}", e);
            NATIVE_AAC
        }
    }
}

/// Process-wide cached [`detect_aac_encoder`]
pub async fn preferred_aac_encoder(ffmpeg: &ToolCommand) -> &'static str {
    static PREFERRED: OnceCell<&'static str> = OnceCell::const_new();
    PREFERRED
        .get_or_init(|| detect_aac_encoder(ffmpeg))
        .await
}

/// Lower the scheduling priority of a child process with `renice` (best effort)
#[cfg(unix)]
pub async fn set_low_priority(pid: u32) {
    let result = Command::new("renice")
        .args(["-n", &LOW_PRIORITY_NICE.to_string(), "-p", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        Ok(status) if status.success() => debug!("Priority of pid {} lowered", pid),
        Ok(status) => debug!("renice for pid {} exited with {}", pid, status),
        Err(e) => debug!("Failed to run renice for pid {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
pub async fn set_low_priority(pid: u32) {
    debug!("Process priority not adjusted on this platform (pid {})", pid);
}

/// Stop a running process without killing it
#[cfg(unix)]
pub fn suspend_process(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGSTOP).map_err(std::io::Error::from)
}

#[cfg(unix)]
pub fn resume_process(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGCONT).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
pub fn suspend_process(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "pause is only supported on unix",
    ))
}

#[cfg(not(unix))]
pub fn resume_process(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "resume is only supported on unix",
    ))
}

/// Normalize permissions of a produced file (best effort, no-op off unix)
pub async fn set_file_permission(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.is_file() {
            return;
        }
        let permissions = std::fs::Permissions::from_mode(OUTPUT_FILE_MODE);
        if let Err(e) = tokio::fs::set_permissions(path, permissions).await {
            debug!("Failed to set permissions on {}: {}", path.display(), e);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
