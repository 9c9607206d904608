//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` per categorizzare i fallimenti attesi
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per `Display` ed `Error`
//!
//! ## Categorie di errori:
//! - `Probe`: ffprobe fallito o output non interpretabile
//! - `NoUsableStream`: Nessuno stream audio/video utilizzabile
//! - `OutputPathUnassigned`: Sessione avviata senza percorso di output
//! - `InvalidStatus`: Stato della sessione non valido per l'operazione
//! - `MissingDependency`: Tool esterno mancante (ffmpeg, ffprobe)
//! - `Validation`: Errori di validazione input/opzioni
//!
//! Gli errori per-file vengono convertiti in diagnostica dal batch driver,
//! gli altri vengono propagati con `anyhow` e interrompono il batch.
//!
//! ## Esempio:
//! ```rust,ignore
//! if !path.is_file() {
//!     return Err(CompressError::Validation(format!("not a file: {}", path.display())));
//! }
//! ```

use std::path::PathBuf;

/// Custom error types for media compression
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("Probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("No usable audio/video stream in {0}")]
    NoUsableStream(PathBuf),

    #[error("Output path not assigned for {0}")]
    OutputPathUnassigned(PathBuf),

    #[error("Invalid session status: {0}")]
    InvalidStatus(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("File validation error: {0}")]
    Validation(String),
}
