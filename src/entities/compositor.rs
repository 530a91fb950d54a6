//! Software presenter - paints frames into an RGBA8 canvas.
//!
//! Used by the headless player and by tests. Each destination pixel inside
//! `dst ∩ canvas` is mapped back to source coordinates (pixel centers), then
//! sampled nearest or bilinear and source-over blended with the paint alpha.
//!
//! Buffers hold straight (non-premultiplied) alpha. Sampling and blending work
//! on premultiplied values, so transparent texels never bleed their color.

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use log::debug;
use std::path::Path;

use crate::entities::frame::{PixelBuffer, Rect};
use crate::entities::traits::{DrawStyle, Presenter};

/// RGBA8 render target
pub struct Canvas {
    image: RgbaImage,
    draws: u64,
}

impl Canvas {
    /// Transparent canvas
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            draws: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }

    /// Number of `draw` calls so far
    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn clear(&mut self, rgba: [u8; 4]) {
        for px in self.image.pixels_mut() {
            *px = Rgba(rgba);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(self.image.get_pixel(x, y).0)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Write canvas as PNG
    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Saved canvas to {}", path.display());
        Ok(())
    }
}

impl Presenter for Canvas {
    fn draw(&mut self, frame: &PixelBuffer, src: Rect, dst: Rect, style: &DrawStyle) {
        self.draws += 1;

        let src = src.intersect(&frame.bounds());
        let clip = dst.intersect(&self.bounds());
        if src.is_empty() || dst.is_empty() || clip.is_empty() || style.alpha == 0 {
            return;
        }

        let sx = src.width() as f32 / dst.width() as f32;
        let sy = src.height() as f32 / dst.height() as f32;
        let mask = style.circle_mask.then(|| Circle::inscribed(&dst));
        let opacity = style.alpha as f32 / 255.0;

        for y in clip.top..clip.bottom {
            for x in clip.left..clip.right {
                if let Some(circle) = &mask {
                    if !circle.contains(x, y) {
                        continue;
                    }
                }

                // Source position of this destination pixel's center
                let u = src.left as f32 + (x - dst.left) as f32 * sx + sx * 0.5;
                let v = src.top as f32 + (y - dst.top) as f32 * sy + sy * 0.5;
                let mut color = if style.filter {
                    sample_bilinear(frame, &src, u - 0.5, v - 0.5)
                } else {
                    sample_nearest(frame, &src, u, v)
                };
                if let Some(tint) = style.tint {
                    color = apply_tint(color, tint);
                }

                let px = self.image.get_pixel_mut(x as u32, y as u32);
                px.0 = blend_over(px.0, color, opacity);
            }
        }
    }
}

/// Largest circle inside a rect, centered
struct Circle {
    cx: f32,
    cy: f32,
    r2: f32,
}

impl Circle {
    fn inscribed(rect: &Rect) -> Self {
        let r = rect.width().min(rect.height()) as f32 / 2.0;
        Self {
            cx: (rect.left + rect.right) as f32 / 2.0,
            cy: (rect.top + rect.bottom) as f32 / 2.0,
            r2: r * r,
        }
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        let dx = x as f32 + 0.5 - self.cx;
        let dy = y as f32 + 0.5 - self.cy;
        dx * dx + dy * dy <= self.r2
    }
}

/// Premultiplied texel, channels normalized to 0..1
fn fetch(frame: &PixelBuffer, src: &Rect, x: i32, y: i32) -> [f32; 4] {
    let x = x.clamp(src.left, src.right - 1) as u32;
    let y = y.clamp(src.top, src.bottom - 1) as u32;
    let p = frame.pixel(x, y).unwrap_or([0, 0, 0, 0]);
    let a = p[3] as f32 / 255.0;
    [
        p[0] as f32 / 255.0 * a,
        p[1] as f32 / 255.0 * a,
        p[2] as f32 / 255.0 * a,
        a,
    ]
}

fn sample_nearest(frame: &PixelBuffer, src: &Rect, u: f32, v: f32) -> [f32; 4] {
    fetch(frame, src, u.floor() as i32, v.floor() as i32)
}

fn sample_bilinear(frame: &PixelBuffer, src: &Rect, u: f32, v: f32) -> [f32; 4] {
    let x0 = u.floor();
    let y0 = v.floor();
    let fx = u - x0;
    let fy = v - y0;
    let (x0, y0) = (x0 as i32, y0 as i32);

    let p00 = fetch(frame, src, x0, y0);
    let p10 = fetch(frame, src, x0 + 1, y0);
    let p01 = fetch(frame, src, x0, y0 + 1);
    let p11 = fetch(frame, src, x0 + 1, y0 + 1);

    let mut out = [0.0; 4];
    for c in 0..4 {
        let top = p00[c] + (p10[c] - p00[c]) * fx;
        let bottom = p01[c] + (p11[c] - p01[c]) * fx;
        out[c] = top + (bottom - top) * fy;
    }
    out
}

/// Modulate a premultiplied color by a straight RGBA tint
fn apply_tint(color: [f32; 4], tint: [u8; 4]) -> [f32; 4] {
    let ta = tint[3] as f32 / 255.0;
    [
        color[0] * tint[0] as f32 / 255.0 * ta,
        color[1] * tint[1] as f32 / 255.0 * ta,
        color[2] * tint[2] as f32 / 255.0 * ta,
        color[3] * ta,
    ]
}

/// Source-over: premultiplied `top` onto straight-alpha `bottom` with extra
/// opacity. Result is straight alpha.
fn blend_over(bottom: [u8; 4], top: [f32; 4], opacity: f32) -> [u8; 4] {
    let top_alpha = (top[3] * opacity).clamp(0.0, 1.0);
    let bottom_alpha = bottom[3] as f32 / 255.0;
    let bottom_weight = bottom_alpha * (1.0 - top_alpha);
    let out_a = top_alpha + bottom_weight;
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = bottom[c] as f32 / 255.0;
        let premul = top[c] * opacity + b * bottom_weight;
        out[c] = ((premul / out_a).clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out[3] = (out_a.clamp(0.0, 1.0) * 255.0).round() as u8;
    out
}
