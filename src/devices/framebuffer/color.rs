//! Color representation and packed-pixel conversion
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from `0xRRGGBB`
    pub const fn from_hex(rgb: u32) -> Self {
        Self::from_argb(0xFF00_0000 | rgb)
    }

    /// Unpack a `0xAARRGGBB` pixel
    pub const fn from_argb(pixel: u32) -> Self {
        Self {
            r: ((pixel >> 16) & 0xFF) as u8,
            g: ((pixel >> 8) & 0xFF) as u8,
            b: (pixel & 0xFF) as u8,
            a: (pixel >> 24) as u8,
        }
    }

    pub const fn to_argb(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub fn from_rgb888(color: Rgb888) -> Self {
        Self::new(color.r(), color.g(), color.b())
    }

    pub fn to_rgb888(self) -> Rgb888 {
        Rgb888::new(self.r, self.g, self.b)
    }

    /// Mix two colors with a ratio (0.0 = self, 1.0 = other)
    pub fn mix(&self, other: &Color, ratio: f32) -> Color {
        let ratio = ratio.min(1.0).max(0.0);
        let inv_ratio = 1.0 - ratio;
        Color::new(
            ((self.r as f32 * inv_ratio) + (other.r as f32 * ratio)) as u8,
            ((self.g as f32 * inv_ratio) + (other.g as f32 * ratio)) as u8,
            ((self.b as f32 * inv_ratio) + (other.b as f32 * ratio)) as u8,
        )
    }
}
