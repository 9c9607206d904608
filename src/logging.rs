//! # Logging Setup Module
//!
//! Costruisce il subscriber `tracing` a partire da un `LogConfig` esplicito,
//! creato in `main` e passato qui una sola volta all'avvio.
//!
//! ## Responsabilità:
//! - Layer console (stderr, con colori) e layer file (append, senza ANSI)
//! - Livello globale da `LogConfig`, sovrascrivibile con `RUST_LOG`
//! - Routing per singola chiamata tramite target dedicati:
//!   - `target: CONSOLE_ONLY` → solo console
//!   - `target: FILE_ONLY` → solo file
//!   - qualsiasi altro target → tutte le destinazioni attive
//!
//! ## Esempio:
//! ```rust,ignore
//! logging::init(&LogConfig::default())?;
//! tracing::info!(target: logging::CONSOLE_ONLY, "{}", ffmpeg_stderr);
//! ```

use anyhow::Result;
use clap::ValueEnum;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{Level, Subscriber};
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Target routed only to the console layer
pub const CONSOLE_ONLY: &str = "console";
/// Target routed only to the file layer
pub const FILE_ONLY: &str = "file";

pub const LOG_FILE_NAME: &str = "media-compressor.log";

/// Active log destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogMode {
    Console,
    File,
    #[default]
    #[value(name = "console-file")]
    ConsoleFile,
}

impl LogMode {
    fn console(&self) -> bool {
        matches!(self, Self::Console | Self::ConsoleFile)
    }

    fn file(&self) -> bool {
        matches!(self, Self::File | Self::ConsoleFile)
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub mode: LogMode,
    /// Directory holding the log file
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            mode: LogMode::default(),
            dir: PathBuf::from("logs"),
        }
    }
}

fn routes_to_console(target: &str) -> bool {
    target != FILE_ONLY
}

fn routes_to_file(target: &str) -> bool {
    target != CONSOLE_ONLY
}

/// Build the layered subscriber described by `config`
pub fn build_subscriber(config: &LogConfig) -> Result<Box<dyn Subscriber + Send + Sync>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();

    let console_layer = config.mode.console().then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter_fn(|meta| routes_to_console(meta.target())))
    });

    let file_layer = if config.mode.file() {
        std::fs::create_dir_all(&config.dir).map_err(|e| {
            anyhow::anyhow!("Failed to create log directory {}: {}", config.dir.display(), e)
        })?;
        let path = config.dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", path.display(), e))?;

        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter_fn(|meta| routes_to_file(meta.target()))),
        )
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    Ok(Box::new(subscriber))
}

/// Install the subscriber globally
pub fn init(config: &LogConfig) -> Result<()> {
    let subscriber = build_subscriber(config)?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_destination_routing() {
        assert!(routes_to_console(CONSOLE_ONLY));
        assert!(!routes_to_console(FILE_ONLY));
        assert!(routes_to_file(FILE_ONLY));
        assert!(!routes_to_file(CONSOLE_ONLY));
        assert!(routes_to_console("media_compressor::encoder"));
        assert!(routes_to_file("media_compressor::encoder"));
    }

    #[test]
    fn test_file_layer_respects_destination() {
        let temp_dir = TempDir::new().unwrap();
        let config = LogConfig {
            level: Level::DEBUG,
            mode: LogMode::File,
            dir: temp_dir.path().join("logs"),
        };

        let subscriber = build_subscriber(&config).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: FILE_ONLY, "written to file");
            tracing::info!(target: CONSOLE_ONLY, "console only line");
            tracing::warn!("shared line");
        });

        let content = std::fs::read_to_string(config.dir.join(LOG_FILE_NAME)).unwrap();
        assert!(content.contains("written to file"));
        assert!(content.contains("shared line"));
        assert!(!content.contains("console only line"));
    }
}
