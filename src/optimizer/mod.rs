//! # Optimizer Module
//!
//! Orchestrazione del batch, separata in sottomoduli:
//! - `media_compressor`: Orchestratore principale
//! - `task_encoder`: Worker per singoli file
//! - `placement`: Destinazione finale dell'output (replace, discard, stream copy)
//! - `progress_tracker`: Gestione progress unificata
//! - `path_resolver`: Logica di calcolo path centralizzata

pub mod media_compressor;
pub mod path_resolver;
pub mod placement;
pub mod progress_tracker;
pub mod task_encoder;

pub use media_compressor::MediaCompressor;
pub use path_resolver::PathResolver;
pub use placement::{Placement, PlacementResult};
pub use progress_tracker::ProgressTracker;
pub use task_encoder::{TaskEncoder, TaskOutcome, TaskReport};
