//! # Adaptive 16-Color Palette
//!
//! vga16fb exposes a 16-entry pseudocolor table. Pixels arrive as 24-bit
//! colors, so the table is filled lazily: each new color either matches an
//! existing entry within a tolerance or takes a free slot.
//!
//! ## Matching
//!
//! ```text
//! shift 6: compare top 2 bits per channel (up to 64 buckets)
//!     │ no match, table full
//!     ▼
//! shift 7: compare top 1 bit per channel (up to 8 buckets)
//!     │ no match, table full
//!     ▼
//! fallback: last entry added
//! ```
//!
//! 64 buckets is too many and 8 too few; 16 sits in between, so the coarse
//! pass only runs once the fine pass has filled the table. Entries are
//! never reordered or evicted until the head is re-initialized.

use crate::devices::framebuffer::color::Color;

pub const PALETTE_CAPACITY: usize = 16;

const SHIFTS: [u32; 2] = [6, 7];

/// Outcome of resolving a pixel against the palette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Existing(usize),
    /// A new entry was appended; the hardware color map is stale.
    Inserted(usize),
    /// No match and no room at either precision.
    Fallback(usize),
}

impl Lookup {
    pub fn index(self) -> usize {
        match self {
            Lookup::Existing(index) | Lookup::Inserted(index) | Lookup::Fallback(index) => index,
        }
    }
}

/// Software mirror of the hardware color table. Channels are stored in
/// 16-bit hardware slots with the 8-bit value in the high byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    red: [u16; PALETTE_CAPACITY],
    green: [u16; PALETTE_CAPACITY],
    blue: [u16; PALETTE_CAPACITY],
    size: usize,
}

impl Palette {
    pub const fn new() -> Self {
        Self {
            red: [0; PALETTE_CAPACITY],
            green: [0; PALETTE_CAPACITY],
            blue: [0; PALETTE_CAPACITY],
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == PALETTE_CAPACITY
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn red(&self) -> &[u16] {
        &self.red[..self.size]
    }

    pub fn green(&self) -> &[u16] {
        &self.green[..self.size]
    }

    pub fn blue(&self) -> &[u16] {
        &self.blue[..self.size]
    }

    pub fn entry(&self, index: usize) -> Option<Color> {
        if index >= self.size {
            return None;
        }
        Some(Color::new(
            (self.red[index] >> 8) as u8,
            (self.green[index] >> 8) as u8,
            (self.blue[index] >> 8) as u8,
        ))
    }

    /// Resolve an ARGB pixel to a palette index, growing the table if needed.
    pub fn lookup(&mut self, pixel: u32) -> Lookup {
        let Color { r, g, b, .. } = Color::from_argb(pixel);
        let (red, green, blue) = (r as u16, g as u16, b as u16);

        for shift in SHIFTS {
            let matched = (0..self.size).find(|&index| {
                self.red[index] >> (8 + shift) == red >> shift
                    && self.green[index] >> (8 + shift) == green >> shift
                    && self.blue[index] >> (8 + shift) == blue >> shift
            });
            if let Some(index) = matched {
                return Lookup::Existing(index);
            }

            if self.size < PALETTE_CAPACITY {
                let index = self.size;
                self.size += 1;

                self.red[index] = red << 8;
                self.green[index] = green << 8;
                self.blue[index] = blue << 8;

                return Lookup::Inserted(index);
            }
        }

        // The first entry is usually the background, so reuse the newest.
        Lookup::Fallback(self.size - 1)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}
