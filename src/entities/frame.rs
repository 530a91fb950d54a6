//! Pixel buffers shared between the decode worker and the presenter.
//!
//! **Why**: The engine double-buffers decoded frames. A buffer is a plain owned
//! value (not `Clone`), so handing it to the decoder, the presenter or back to
//! the provider is a move. The same buffer can never be released twice.
//!
//! # Pixel Formats
//!
//! - `PixelFormat::Rgba8888`: 4 bytes/pixel, the only format the engine accepts
//! - `PixelFormat::Rgb565`: 2 bytes/pixel, packed
//! - `PixelFormat::Alpha8`: 1 byte/pixel, coverage only
//!
//! Providers may hand out buffers larger than requested, so rows are addressed
//! through `stride()` rather than `width() * bytes_per_pixel()`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source so buffers can be told apart in logs and tests
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Pixel format of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8888, // 8-bit RGBA, straight alpha
    Rgb565,   // 16-bit packed RGB, no alpha
    Alpha8,   // 8-bit alpha mask
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Alpha8 => 1,
        }
    }
}

/// Integer rectangle in pixels (origin top-left, exclusive right/bottom).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Rect at origin with given size
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Overlap of two rects (may be empty)
    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        }
    }
}

/// Owned pixel buffer with row stride.
#[derive(Debug)]
pub struct PixelBuffer {
    id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate zeroed (transparent) buffer with tightly packed rows
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            format,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Unique id for the lifetime of the process
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whole buffer as a rect at origin
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Size in bytes
    pub fn mem(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Row `y` as bytes (`stride()` long)
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.stride]
    }

    /// Fill every pixel with an RGBA color. No-op for non-RGBA formats.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        if self.format != PixelFormat::Rgba8888 {
            return;
        }
        let row_bytes = self.width as usize * 4;
        for y in 0..self.height {
            let row = self.row_mut(y);
            for px in row[..row_bytes].chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
    }

    /// Read RGBA pixel. Returns `None` out of bounds or for non-RGBA formats.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height || self.format != PixelFormat::Rgba8888 {
            return None;
        }
        let i = y as usize * self.stride + x as usize * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    /// Check the engine's buffer contract: at least `min_width`x`min_height`, RGBA8888.
    pub fn satisfies(&self, min_width: u32, min_height: u32) -> bool {
        self.width >= min_width
            && self.height >= min_height
            && self.format == PixelFormat::Rgba8888
    }
}
