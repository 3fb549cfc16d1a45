//! Density-to-color normalization and the packed RGBA pixel buffer.
//!
//! A cell with count `v` maps to an intensity
//!
//! ```text
//! d = (ln(1 + v) / ln(1 + max)) ^ gamma
//! ```
//!
//! which is then either used as the alpha of the foreground color
//! (transparent mode) or as the blend factor from background to
//! foreground (solid mode).

use crate::density::DensityMatrix;
use crate::types::{Color, Settings};

/// Pack RGBA channels into one `u32` whose little-endian bytes are
/// `[r, g, b, a]`, matching the byte order of an `ImageData` buffer.
#[must_use]
pub const fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    u32::from_le_bytes([r, g, b, a])
}

/// Split a packed pixel back into `[r, g, b, a]`.
#[must_use]
pub const fn unpack_rgba(pixel: u32) -> [u8; 4] {
    pixel.to_le_bytes()
}

/// One packed RGBA value per canvas pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    size: u32,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    /// Create a fully transparent `size * size` buffer.
    #[must_use]
    pub fn new(size: u32) -> Self {
        Self {
            size,
            pixels: vec![0; size as usize * size as usize],
        }
    }

    /// Width and height in pixels.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Packed pixels.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Packed pixel at `(x, y)`, or `None` outside the canvas.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.size || y >= self.size {
            return None;
        }
        self.pixels
            .get(y as usize * self.size as usize + x as usize)
            .copied()
    }

    /// Set every pixel to `value`.
    pub fn fill(&mut self, value: u32) {
        self.pixels.fill(value);
    }

    /// Raw RGBA bytes, four per pixel.
    #[must_use]
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|&p| unpack_rgba(p)).collect()
    }
}

/// Normalization parameters captured from [`Settings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMap {
    /// Color of saturated cells.
    pub foreground: Color,
    /// Color of untouched cells in solid mode.
    pub background: Color,
    /// Blend over an opaque background instead of using alpha.
    pub solid: bool,
    /// Exponent applied to the log-normalized intensity.
    pub gamma: f64,
}

impl ColorMap {
    /// Take the color fields from `settings`.
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            foreground: settings.foreground,
            background: settings.background,
            solid: settings.solid_bg,
            gamma: settings.gamma_exponent,
        }
    }

    /// Pixel value for cells with no hits.
    #[must_use]
    pub const fn background_fill(&self) -> u32 {
        if self.solid {
            let bg = self.background;
            pack_rgba(bg.r, bg.g, bg.b, 255)
        } else {
            0
        }
    }

    /// Display intensity in `[0, 1]` for a count of `value` when the
    /// largest count is `max`.
    ///
    /// An empty cell yields 0. The maximum is floored at 1, so a canvas
    /// whose cells were each hit once draws them at full intensity.
    #[must_use]
    pub fn intensity(&self, value: u32, max: u32) -> f64 {
        if value == 0 {
            return 0.0;
        }
        let log_norm = f64::from(value).ln_1p() / f64::from(max.max(1)).ln_1p();
        log_norm.clamp(0.0, 1.0).powf(self.gamma)
    }

    /// Pixel value for a cell with count `value` (assumed non-zero).
    #[must_use]
    pub fn color(&self, value: u32, max: u32) -> u32 {
        let d = self.intensity(value, max);
        let fg = self.foreground;
        if self.solid {
            let bg = self.background;
            pack_rgba(
                blend(bg.r, fg.r, d),
                blend(bg.g, fg.g, d),
                blend(bg.b, fg.b, d),
                255,
            )
        } else {
            pack_rgba(fg.r, fg.g, fg.b, to_channel(255.0 * d))
        }
    }

    /// Recompute every pixel of `pixels` from `density`.
    ///
    /// The result depends only on the density and this map, so applying
    /// it twice produces the same buffer.
    pub fn apply(&self, density: &DensityMatrix, pixels: &mut PixelBuffer) {
        let max = density.max_value();
        pixels.fill(self.background_fill());
        for (pixel, &value) in pixels.pixels.iter_mut().zip(density.cells()) {
            if value > 0 {
                *pixel = self.color(value, max);
            }
        }
    }
}

/// Linear blend of one channel from `from` to `to` by `t`.
fn blend(from: u8, to: u8, t: f64) -> u8 {
    let from = f64::from(from);
    to_channel((f64::from(to) - from).mul_add(t, from))
}

/// Round and clamp a channel value.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
