//! Collaborator traits for dependency inversion.
//!
//! The playback engine in `core` only knows these interfaces. Concrete
//! decoders, allocators, task queues, clocks and painters plug in from
//! `entities` (reference implementations) or from the host application.

use crate::entities::frame::{PixelBuffer, PixelFormat, Rect};
use crate::error::DecodeError;

/// Boxed unit of work posted to a [`TaskQueue`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Decoded frame sequence (GIF/WebP decoder, procedural generator, ...).
///
/// Called from the decode worker thread, hence `Send + Sync`.
pub trait FrameSource: Send + Sync {
    /// Intrinsic width in pixels
    fn width(&self) -> u32;

    /// Intrinsic height in pixels
    fn height(&self) -> u32;

    /// Number of frames (engine rejects 0)
    fn frame_count(&self) -> usize;

    /// Loop count stored in the source data. 0 loops forever.
    fn default_loop_count(&self) -> u32;

    /// True if every pixel of every frame is fully opaque
    fn is_opaque(&self) -> bool;

    /// Write frame `index` into `output` and return the delay in ms before it
    /// should become visible.
    ///
    /// `previous` is the frame whose pixels `output` still holds, if known,
    /// for decoders that reconstruct incrementally.
    fn get_frame(
        &self,
        index: usize,
        output: &mut PixelBuffer,
        previous: Option<usize>,
    ) -> Result<u64, DecodeError>;
}

/// Pixel buffer allocation strategy.
///
/// `release_buffer` may be called from any thread (the decode worker releases
/// the back buffer when it finds the engine destroyed) and must not block
/// indefinitely.
pub trait BufferProvider: Send + Sync {
    /// Buffer of at least `min_width`x`min_height`, RGBA8888
    fn acquire_buffer(&self, min_width: u32, min_height: u32) -> PixelBuffer;

    /// Buffer is no longer referenced by the engine and may be reused
    fn release_buffer(&self, buffer: PixelBuffer);
}

/// Allocates a fresh buffer on every request, drops on release.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllocatingProvider;

impl BufferProvider for AllocatingProvider {
    fn acquire_buffer(&self, min_width: u32, min_height: u32) -> PixelBuffer {
        PixelBuffer::new(min_width, min_height, PixelFormat::Rgba8888)
    }

    fn release_buffer(&self, _buffer: PixelBuffer) {}
}

/// Serialized background queue the engine posts decode tasks to.
///
/// Contract: `post` never runs the job inline and never blocks; jobs posted to
/// one queue run one at a time in FIFO order.
pub trait TaskQueue: Send + Sync {
    fn post(&self, job: Job);
}

/// Host hooks for arranging the next paint.
///
/// `request_repaint_at` is called from the decode worker thread.
pub trait RepaintScheduler: Send + Sync {
    /// Call `on_tick()` or `present()` at (or after) clock time `at_ms`
    fn request_repaint_at(&self, at_ms: u64);

    /// Present again as soon as possible
    fn request_repaint_now(&self);
}

/// Host that never repaints on request (polling hosts, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRepaint;

impl RepaintScheduler for NoopRepaint {
    fn request_repaint_at(&self, _at_ms: u64) {}
    fn request_repaint_now(&self) {}
}

/// Millisecond time source for swap deadlines.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// How the front buffer is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawStyle {
    /// Mask to the largest circle contained in the destination bounds
    pub circle_mask: bool,
    /// Paint alpha (255 = opaque)
    pub alpha: u8,
    /// Bilinear filtering when scaling
    pub filter: bool,
    /// Color filter: multiply RGBA by this tint, `None` paints unmodified
    pub tint: Option<[u8; 4]>,
}

impl Default for DrawStyle {
    fn default() -> Self {
        Self {
            circle_mask: false,
            alpha: 255,
            filter: true,
            tint: None,
        }
    }
}

/// Paints a ready frame. Runs on the host's render thread, outside the engine lock.
pub trait Presenter {
    /// Paint `src` region of `frame` into `dst`
    fn draw(&mut self, frame: &PixelBuffer, src: Rect, dst: Rect, style: &DrawStyle);
}
