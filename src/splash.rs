//! # Demo Splash Scene
//!
//! A boot splash sized for a 16-color palette: an 8-band vertical
//! gradient, a centered title and an 8-dot throbber. Everything is drawn
//! through embedded-graphics into the head's `PixelBuffer`, so each frame
//! only dirties the throbber dots.
//!
//! ```text
//! ┌──────────────────────────────┐  band 0: theme.top
//! │                              │
//! │         vga16 splash         │  title
//! │                              │
//! │            ∘ ∘ ∘             │
//! │           ∘  ●  ∘            │  throbber, one dot lit per frame
//! │            ∘ ∘ ∘             │
//! └──────────────────────────────┘  band 7: theme.bottom
//! ```

use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    prelude::*,
    primitives::{Circle, PrimitiveStyle, Rectangle},
    text::{Alignment, Text},
};

use crate::devices::framebuffer::color::Color;
use crate::framebuffer::PixelBuffer;

const GRADIENT_BANDS: u32 = 8;
const THROBBER_DOTS: usize = 8;
const THROBBER_RADIUS: i32 = 20;
const DOT_DIAMETER: u32 = 7;

/// Dot positions around the throbber center, in tenths of the radius
const DOT_OFFSETS: [(i32, i32); THROBBER_DOTS] = [
    (0, -10),
    (7, -7),
    (10, 0),
    (7, 7),
    (0, 10),
    (-7, 7),
    (-10, 0),
    (-7, -7),
];

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub top: Color,
    pub bottom: Color,
    pub text: Color,
    pub dot: Color,
    pub dot_lit: Color,
}

impl Theme {
    pub fn midnight() -> Self {
        Self {
            top: Color::from_hex(0x000010),
            bottom: Color::from_hex(0x2040A0),
            text: Color::WHITE,
            dot: Color::from_hex(0x606060),
            dot_lit: Color::from_hex(0xFFC000),
        }
    }
}

pub struct Splash {
    theme: Theme,
    title: String,
}

impl Splash {
    pub fn new(theme: Theme, title: impl Into<String>) -> Self {
        Self {
            theme,
            title: title.into(),
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Gradient and title; the whole surface becomes dirty
    pub fn draw_background(&self, buffer: &mut PixelBuffer) {
        let bounds = buffer.bounds();
        let band_height = bounds.size.height.div_ceil(GRADIENT_BANDS).max(1);

        for band in 0..GRADIENT_BANDS {
            let ratio = band as f32 / (GRADIENT_BANDS - 1) as f32;
            let color = self.theme.top.mix(&self.theme.bottom, ratio);
            Rectangle::new(
                Point::new(0, (band * band_height) as i32),
                Size::new(bounds.size.width, band_height),
            )
            .into_styled(PrimitiveStyle::with_fill(color.to_rgb888()))
            .draw(buffer)
            .ok();
        }

        let style = MonoTextStyle::new(&FONT_6X10, self.theme.text.to_rgb888());
        let anchor = bounds.center() - Point::new(0, bounds.size.height as i32 / 6);
        Text::with_alignment(&self.title, anchor, style, Alignment::Center)
            .draw(buffer)
            .ok();
    }

    /// Redraw the throbber with dot `frame % 8` lit
    pub fn draw_frame(&self, buffer: &mut PixelBuffer, frame: u64) {
        let center = throbber_center(buffer.bounds());
        let lit = (frame % THROBBER_DOTS as u64) as usize;

        for dot in 0..THROBBER_DOTS {
            let color = if dot == lit {
                self.theme.dot_lit
            } else {
                self.theme.dot
            };
            Circle::with_center(dot_position(center, dot), DOT_DIAMETER)
                .into_styled(PrimitiveStyle::with_fill(color.to_rgb888()))
                .draw(buffer)
                .ok();
        }
    }
}

fn throbber_center(bounds: Rectangle) -> Point {
    bounds.center() + Point::new(0, bounds.size.height as i32 / 6)
}

fn dot_position(center: Point, dot: usize) -> Point {
    let (dx, dy) = DOT_OFFSETS[dot % THROBBER_DOTS];
    center + Point::new(dx * THROBBER_RADIUS / 10, dy * THROBBER_RADIUS / 10)
}
