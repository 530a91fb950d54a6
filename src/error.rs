//! Error types for the playback engine and frame sources.
//!
//! Two families:
//! - [`EngineError`]: construction and teardown misuse, surfaced to the caller.
//! - [`DecodeError`]: per-frame failures. At construction they surface wrapped
//!   in `EngineError::Decode`; during playback the engine logs them and pauses.

use thiserror::Error;

use crate::entities::frame::PixelFormat;

/// Errors returned by [`PlaybackEngine`](crate::core::player::PlaybackEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Buffer provider returned a buffer that violates the size/format contract.
    #[error(
        "invalid buffer provided: got {width}x{height} {format:?}, need at least {min_width}x{min_height} Rgba8888"
    )]
    InvalidBuffer {
        width: u32,
        height: u32,
        format: PixelFormat,
        min_width: u32,
        min_height: u32,
    },

    /// Frame source reported zero frames.
    #[error("frame source has no frames")]
    EmptySequence,

    /// Synchronous frame-0 decode failed during construction.
    #[error("initial frame decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// `destroy()` called on an engine that was already destroyed.
    #[error("engine already destroyed")]
    AlreadyDestroyed,

    /// Operation attempted after `destroy()`.
    #[error("cannot perform operation on destroyed engine")]
    Destroyed,
}

/// Per-frame decode failures reported by a [`FrameSource`](crate::entities::traits::FrameSource).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame {index} out of range (sequence has {count} frames)")]
    FrameOutOfRange { index: usize, count: usize },

    #[error("output buffer {width}x{height} too small for {need_width}x{need_height} frame")]
    BufferTooSmall {
        width: u32,
        height: u32,
        need_width: u32,
        need_height: u32,
    },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode failed: {0}")]
    Failed(String),
}
