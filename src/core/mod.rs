//! Core engine modules - player, decode worker, buffer pool, clocks
//!
//! These modules form the playback engine, independent of any UI.

pub mod buffer_pool;
pub mod clock;
pub mod player;
pub mod workers;

// Re-exports for convenience
pub use buffer_pool::{BufferPool, PoolStats};
pub use clock::{ManualClock, MonotonicClock};
pub use player::{EngineBuilder, Opacity, Phase, PlaybackEngine, Presented, SequenceDescriptor};
pub use workers::DecodeWorker;
