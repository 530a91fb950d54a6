//! Animated image loader: GIF and WebP frame sources backed by the `image` crate.
//!
//! All frames are decoded up front into full-canvas RGBA images (the `image`
//! animation decoders already composite disposal/blend ops), so `get_frame`
//! is a row copy and `previous` is not needed.
//!
//! # Delays
//!
//! `get_frame(N)` returns the duration of frame N-1: the engine computes the
//! swap deadline of N as `last_swap + delay`, where `last_swap` is when N-1
//! appeared, so N-1's own duration is what has to elapse.
//!
//! # Loop Count
//!
//! `image` does not expose container loop counts, so they are read from the
//! raw bytes: the GIF NETSCAPE2.0 application extension and the WebP `ANIM`
//! chunk. 0 means loop forever; no loop record means play once.

use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, Delay, ImageFormat, RgbaImage};
use log::{debug, info};
use std::io::{Cursor, Read};
use std::path::Path;

use crate::entities::frame::{PixelBuffer, PixelFormat};
use crate::entities::traits::FrameSource;
use crate::error::DecodeError;

/// Supported container types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Gif,
    WebP,
}

impl ImageKind {
    /// Detect container from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= 6 && (&bytes[..6] == b"GIF87a" || &bytes[..6] == b"GIF89a") {
            return Some(ImageKind::Gif);
        }
        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(ImageKind::WebP);
        }
        None
    }
}

/// Fully decoded animated image
pub struct AnimatedImageSource {
    kind: ImageKind,
    width: u32,
    height: u32,
    frames: Vec<RgbaImage>,
    durations_ms: Vec<u64>,
    loop_count: u32,
    opaque: bool,
}

impl AnimatedImageSource {
    /// Read and decode a GIF/WebP file
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        debug!("Loading animated image: {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Read a whole stream, then decode with the given (or sniffed) kind
    pub fn from_reader<R: Read>(mut reader: R, kind: Option<ImageKind>) -> Result<Self, DecodeError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        match kind {
            Some(kind) => Self::from_bytes_as(kind, &bytes),
            None => Self::from_bytes(&bytes),
        }
    }

    /// Decode, detecting the container from magic bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let kind = ImageKind::sniff(bytes).ok_or_else(|| {
            DecodeError::UnsupportedFormat("not a GIF or WebP stream".to_string())
        })?;
        Self::from_bytes_as(kind, bytes)
    }

    pub fn from_bytes_as(kind: ImageKind, bytes: &[u8]) -> Result<Self, DecodeError> {
        let (frames, durations_ms) = match kind {
            ImageKind::Gif => {
                let decoder = GifDecoder::new(Cursor::new(bytes))?;
                split_frames(decoder.into_frames().collect_frames()?)
            }
            ImageKind::WebP => {
                let decoder = WebPDecoder::new(Cursor::new(bytes))?;
                if decoder.has_animation() {
                    split_frames(decoder.into_frames().collect_frames()?)
                } else {
                    // Still image: one frame, no duration
                    let still = image::load_from_memory_with_format(bytes, ImageFormat::WebP)?;
                    (vec![still.to_rgba8()], vec![0])
                }
            }
        };

        let Some(first) = frames.first() else {
            return Err(DecodeError::Failed("stream contains no frames".to_string()));
        };
        let (width, height) = first.dimensions();

        let loop_count = match kind {
            ImageKind::Gif => gif_loop_count(bytes),
            ImageKind::WebP => webp_loop_count(bytes),
        }
        .map_or(1, u32::from);

        let opaque = frames
            .iter()
            .all(|f| f.pixels().all(|p| p.0[3] == 255));

        info!(
            "Decoded {:?}: {}x{}, {} frames, loop count {}",
            kind,
            width,
            height,
            frames.len(),
            loop_count
        );

        Ok(Self {
            kind,
            width,
            height,
            frames,
            durations_ms,
            loop_count,
            opaque,
        })
    }

    /// Override the container's loop count (0 = forever)
    pub fn with_loop_count(mut self, loop_count: u32) -> Self {
        self.loop_count = loop_count;
        self
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Display duration of each frame as stored in the file (ms)
    pub fn durations_ms(&self) -> &[u64] {
        &self.durations_ms
    }
}

impl FrameSource for AnimatedImageSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn default_loop_count(&self) -> u32 {
        self.loop_count
    }

    fn is_opaque(&self) -> bool {
        self.opaque
    }

    fn get_frame(
        &self,
        index: usize,
        output: &mut PixelBuffer,
        _previous: Option<usize>,
    ) -> Result<u64, DecodeError> {
        let count = self.frames.len();
        let frame = self
            .frames
            .get(index)
            .ok_or(DecodeError::FrameOutOfRange { index, count })?;

        if output.format() != PixelFormat::Rgba8888 {
            return Err(DecodeError::UnsupportedFormat(format!(
                "output buffer is {:?}, need Rgba8888",
                output.format()
            )));
        }
        if output.width() < self.width || output.height() < self.height {
            return Err(DecodeError::BufferTooSmall {
                width: output.width(),
                height: output.height(),
                need_width: self.width,
                need_height: self.height,
            });
        }

        // Frames may be smaller than the canvas in malformed files
        let w = frame.width().min(self.width) as usize;
        let h = frame.height().min(self.height);
        let src_stride = frame.width() as usize * 4;
        let raw = frame.as_raw();
        for y in 0..h {
            let start = y as usize * src_stride;
            output.row_mut(y)[..w * 4].copy_from_slice(&raw[start..start + w * 4]);
        }

        Ok(self.durations_ms[(index + count - 1) % count])
    }
}

/// Separate composited canvases from their delays
fn split_frames(frames: Vec<image::Frame>) -> (Vec<RgbaImage>, Vec<u64>) {
    frames
        .into_iter()
        .map(|frame| {
            let ms = delay_ms(frame.delay());
            (frame.into_buffer(), ms)
        })
        .unzip()
}

/// Delay in whole ms (rounded), 0 when undefined
fn delay_ms(delay: Delay) -> u64 {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return 0;
    }
    let denom = u64::from(denom);
    (u64::from(numer) + denom / 2) / denom
}

/// Loop count from the GIF NETSCAPE2.0 / ANIMEXTS1.0 application extension.
///
/// Walks the block structure up to the first image descriptor, so bytes
/// inside comments or image data never match.
pub fn gif_loop_count(bytes: &[u8]) -> Option<u16> {
    const IDS: [&[u8]; 2] = [b"NETSCAPE2.0", b"ANIMEXTS1.0"];
    if ImageKind::sniff(bytes) != Some(ImageKind::Gif) || bytes.len() < 13 {
        return None;
    }

    // Header (6) + logical screen descriptor (7) + optional global color table
    let packed = bytes[10];
    let mut pos = 13;
    if packed & 0x80 != 0 {
        pos += 3 * (1usize << ((packed & 0x07) + 1));
    }

    // Loop extension belongs before the first frame
    while pos + 1 < bytes.len() && bytes[pos] == 0x21 {
        let label = bytes[pos + 1];
        let mut block = pos + 2;
        let first = block;
        loop {
            let size = *bytes.get(block)? as usize;
            if label == 0xFF && block == first && size == 11 {
                let id = bytes.get(block + 1..block + 12)?;
                if IDS.contains(&id) {
                    // Sub-block: size 3, id 1, loop count u16 LE
                    let sub = bytes.get(block + 12..block + 16)?;
                    if sub[0] == 3 && sub[1] == 1 {
                        return Some(u16::from_le_bytes([sub[2], sub[3]]));
                    }
                }
            }
            block += 1;
            if size == 0 {
                break;
            }
            block += size;
        }
        pos = block;
    }
    None
}

/// Loop count from the WebP `ANIM` chunk
pub fn webp_loop_count(bytes: &[u8]) -> Option<u16> {
    if ImageKind::sniff(bytes) != Some(ImageKind::WebP) {
        return None;
    }
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let fourcc = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]) as usize;
        let data = pos + 8;
        if fourcc == b"ANIM" {
            // Background color (4 bytes), then loop count u16 LE
            if size >= 6 && data + 6 <= bytes.len() {
                return Some(u16::from_le_bytes([bytes[data + 4], bytes[data + 5]]));
            }
            return None;
        }
        // Chunks are padded to even size
        pos = data.checked_add(size + (size & 1))?;
    }
    None
}
