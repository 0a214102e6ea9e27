//! # Planar Flush
//!
//! Converts dirty rectangles of the ARGB surface into VGA planar writes.
//!
//! ## Per Scanline
//!
//! ```text
//! pixels  ──assign_color_index──▶  16 mask rows × row_stride bytes
//!                                   row c, byte x/8, bit 0x80 >> (x % 8)
//!                                            │
//!            for each color c, each byte b   ▼   with a nonzero mask
//!                           Set/Reset = c, Bit Mask = mask, latch_or
//! ```
//!
//! One bus write commits up to 8 pixels of one color, so a scanline costs
//! at most `16 * bytes` writes and usually far fewer.

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::trace;

use crate::backend::head::set_palette;
use crate::devices::framebuffer::palette::{Lookup, Palette, PALETTE_CAPACITY};
use crate::devices::framebuffer::{FramebufferDevice, VideoMemory};
use crate::devices::vga::{PlanarWriter, VgaPorts};
use crate::framebuffer::PixelBuffer;

/// Everything a flush touches, borrowed from the backend for its duration
pub(crate) struct FlushTarget<'a, D, P, M> {
    pub device: Option<&'a D>,
    pub palette: &'a mut Palette,
    pub writer: &'a mut PlanarWriter<P>,
    pub memory: &'a mut M,
    pub row_stride: usize,
}

impl<'a, D, P, M> FlushTarget<'a, D, P, M>
where
    D: FramebufferDevice,
    P: VgaPorts,
    M: VideoMemory,
{
    /// Resolve a pixel to its palette index, uploading the color map when
    /// the palette grew.
    pub fn assign_color_index(&mut self, pixel: u32) -> u8 {
        let lookup = self.palette.lookup(pixel);
        if let Lookup::Inserted(_) = lookup {
            set_palette(self.device, self.palette);
            trace!(
                "palette now has {} colours (added {:06x})",
                self.palette.len(),
                pixel & 0x00FF_FFFF
            );
        }
        lookup.index() as u8
    }

    /// Program the base register state, push the palette, then flush every
    /// dirty rectangle top to bottom and clear the region.
    pub fn flush_updated_areas(&mut self, buffer: &mut PixelBuffer) {
        self.writer.reset();
        set_palette(self.device, self.palette);

        let areas = buffer.updated_areas().sorted_rectangles();
        for area in &areas {
            self.flush_area(buffer, area);
        }

        buffer.updated_areas_mut().clear();
    }

    pub fn flush_area(&mut self, buffer: &PixelBuffer, area: &Rectangle) {
        let addressable = Rectangle::new(
            Point::zero(),
            Size::new((self.row_stride * 8) as u32, buffer.height as u32),
        );
        let area = area
            .intersection(&buffer.bounds())
            .intersection(&addressable);
        if area.is_zero_sized() {
            return;
        }

        let x1 = area.top_left.x as usize;
        let x2 = x1 + area.size.width as usize;
        let y1 = area.top_left.y as usize;
        let y2 = y1 + area.size.height as usize;
        let bytes = x1 / 8..x2.div_ceil(8);

        let stride = self.row_stride;
        let mut masks = vec![0u8; PALETTE_CAPACITY * stride];
        let data = buffer.argb32_data();

        for y in y1..y2 {
            masks.fill(0);

            let row = &data[y * buffer.width..(y + 1) * buffer.width];
            for x in x1..x2 {
                let color = self.assign_color_index(row[x]) as usize;
                masks[color * stride + x / 8] |= 0x80 >> (x % 8);
            }

            for color in 0..PALETTE_CAPACITY {
                let mask_row = &masks[color * stride..(color + 1) * stride];
                for byte in bytes.clone() {
                    let mask = mask_row[byte];
                    if mask == 0 {
                        continue;
                    }
                    self.writer
                        .write_masked(&mut *self.memory, y * stride + byte, color as u8, mask);
                }
            }
        }
    }
}
