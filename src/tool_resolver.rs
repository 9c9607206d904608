//! # Tool Path Resolver
//!
//! This module handles finding the external encoder tools (ffmpeg, ffprobe):
//! - A directory given by `MEDIA_COMPRESSOR_TOOLS_DIR` (portable builds, CI)
//! - System-installed tools on `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable pointing at a directory holding ffmpeg/ffprobe
pub const TOOLS_DIR_ENV: &str = "MEDIA_COMPRESSOR_TOOLS_DIR";

/// Tools the compressor cannot run without
pub const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Tool path resolver for different deployment environments
#[derive(Debug, Clone)]
pub struct ToolPathResolver {
    /// Directory checked before `PATH`
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver honouring `MEDIA_COMPRESSOR_TOOLS_DIR`
    pub fn new() -> Self {
        let tools_dir = env::var_os(TOOLS_DIR_ENV).map(PathBuf::from).filter(|dir| {
            let exists = dir.is_dir();
            if !exists {
                warn!("{} points to a missing directory: {}", TOOLS_DIR_ENV, dir.display());
            }
            exists
        });

        Self { tools_dir }
    }

    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(tools_dir.into()),
        }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = tools_dir.join(Self::executable_name(tool_name));
            if bundled_path.is_file() {
                debug!("Using tool from tools dir: {} -> {:?}", tool_name, bundled_path);
                return Some(bundled_path);
            }
            debug!("Tool not in tools dir: {:?}", bundled_path);
        }

        if let Some(system_path) = Self::find_in_system_path(tool_name) {
            debug!("Using system tool: {} -> {:?}", tool_name, system_path);
            return Some(system_path);
        }

        warn!("Tool not found: {}", tool_name);
        None
    }

    fn executable_name(tool_name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", tool_name)
        } else {
            tool_name.to_string()
        }
    }

    /// Find tool in system PATH
    fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let tool_with_ext = Self::executable_name(tool_name);
        let path_var = env::var_os("PATH")?;

        env::split_paths(&path_var)
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| path.is_file())
    }

    /// Check if a tool is available and provide installation instructions if not
    pub fn check_tool_with_instructions(&self, tool_name: &str) -> Result<PathBuf, String> {
        match self.resolve_tool(tool_name) {
            Some(path) => Ok(path),
            None if cfg!(target_os = "linux") => Err(format!(
                "Tool '{}' not found in system PATH.\n\
                To install on Linux, run:\n  sudo apt-get install ffmpeg",
                tool_name
            )),
            None => Err(format!(
                "Tool '{}' not found. Install ffmpeg or set {} to its directory.",
                tool_name, TOOLS_DIR_ENV
            )),
        }
    }

    /// Check that every required tool resolves
    pub fn verify_tools(&self) -> Result<(), String> {
        let missing_messages: Vec<String> = REQUIRED_TOOLS
            .iter()
            .filter_map(|tool| self.check_tool_with_instructions(tool).err())
            .collect();

        if missing_messages.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "Some required tools are missing:\n\n{}",
                missing_messages.join("\n\n")
            ))
        }
    }

    pub fn tools_dir(&self) -> Option<&Path> {
        self.tools_dir.as_deref()
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}
