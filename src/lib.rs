//! ANIMSEQ - animated image frame-sequence playback
//!
//! Re-exports all modules for use by the binary target.

// Core engine (player, worker, pool, clocks)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod runner;

// Re-export commonly used types
pub use config::{LoopPolicy, PlaybackConfig};
pub use core::player::{Phase, PlaybackEngine, Presented};
pub use core::workers::DecodeWorker;
pub use error::{DecodeError, EngineError};

pub use entities::{AnimatedImageSource, Canvas, FrameSource, PixelBuffer, Rect};
