//! # Media Compressor Library
//!
//! Modulo principale della libreria: espone le API pubbliche usate da `main.rs`.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi principali tramite re-exports
//!
//! ## Architettura dei moduli:
//! - `config`: Opzioni di encoding, configurazione batch e filtro estensioni
//! - `error`: Tipi di errore della libreria
//! - `logging`: Subscriber `tracing` con destinazioni console/file
//! - `file_manager` / `dedup`: Discovery dei media e deduplicazione
//! - `model`: Probe, Processing Marker e specifica di encoding
//! - `encoder`: Costruzione argomenti e sessione ffmpeg
//! - `optimizer`: Orchestratore del batch e placement degli output
//! - `progress`: Barre di avanzamento e statistiche
//! - `platform` / `tool_resolver`: Strumenti esterni e controllo processi
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use media_compressor::{BatchConfig, ControlHub, MediaCompressor};
//!
//! let mut compressor = MediaCompressor::new(config).await?;
//! let stats = compressor.run(&mut ControlHub::with_default_sources()).await?;
//! ```

pub mod config;
pub mod dedup;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod logging;
pub mod model;
pub mod optimizer;
pub mod platform;
pub mod progress;
pub mod tool_resolver;
pub mod utils;

pub use config::{BatchConfig, EncodeOption, ExistsMode, FilterConfig, SortMode, VideoCodec};
pub use encoder::control::ControlHub;
pub use encoder::Encoder;
pub use error::CompressError;
pub use optimizer::MediaCompressor;
pub use progress::BatchStats;
