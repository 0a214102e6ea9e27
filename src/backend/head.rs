//! The single vga16fb head

use embedded_graphics::primitives::Rectangle;
use log::{trace, warn};

use crate::devices::framebuffer::color::Color;
use crate::devices::framebuffer::palette::Palette;
use crate::devices::framebuffer::FramebufferDevice;
use crate::framebuffer::PixelBuffer;

/// Handle the host uses to name a head; only the issuing backend accepts it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadId(pub(crate) usize);

/// Geometry, software surface, video memory mapping and palette of the
/// display.
///
/// The pixel buffer lives from query to close; the mapping only while the
/// backend is mapped to the device.
pub struct Head<M> {
    pub(crate) area: Rectangle,
    pub(crate) pixel_buffer: Option<PixelBuffer>,
    pub(crate) mapping: Option<M>,
    /// Bytes of video memory: `area.height * row_stride`
    pub(crate) size: usize,
    pub(crate) palette: Palette,
}

impl<M> Head<M> {
    pub const fn new() -> Self {
        Self {
            area: Rectangle::zero(),
            pixel_buffer: None,
            mapping: None,
            size: 0,
            palette: Palette::new(),
        }
    }

    pub fn area(&self) -> Rectangle {
        self.area
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn is_initialized(&self) -> bool {
        self.pixel_buffer.is_some()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Allocate a black surface matching `area` and forget the palette
    pub(crate) fn initialize(&mut self) {
        let mut buffer = PixelBuffer::new(
            self.area.size.width as usize,
            self.area.size.height as usize,
        );
        buffer.fill_with_hex_color(None, Color::BLACK.to_argb());

        self.pixel_buffer = Some(buffer);
        self.palette.reset();
    }

    pub(crate) fn uninitialize(&mut self) {
        self.pixel_buffer = None;
    }

    pub(crate) fn unmap(&mut self) {
        if self.mapping.take().is_some() {
            trace!("unmapped {} bytes of video memory", self.size);
        }
    }
}

impl<M> Default for Head<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Upload the palette to the device. Nothing to do while the device is
/// closed or the palette is empty.
pub(crate) fn set_palette<D: FramebufferDevice>(device: Option<&D>, palette: &Palette) {
    let Some(device) = device else {
        return;
    };
    if palette.is_empty() {
        return;
    }

    if let Err(err) = device.put_color_map(palette) {
        warn!("could not upload {} palette entries: {}", palette.len(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EmulatedMemory, FakeDevice};
    use embedded_graphics::prelude::*;

    #[test]
    fn initialize_allocates_black_surface_and_resets_palette() {
        let mut head: Head<EmulatedMemory> = Head::new();
        head.area = Rectangle::new(Point::zero(), Size::new(16, 4));
        head.palette.lookup(0xFFFFFFFF);

        head.initialize();

        let buffer = head.pixel_buffer.as_ref().expect("surface");
        assert_eq!((buffer.width, buffer.height), (16, 4));
        assert!(buffer.argb32_data().iter().all(|&p| p == 0xFF000000));
        assert!(head.palette.is_empty());
        assert!(head.is_initialized());
        assert!(!head.is_mapped());
    }

    #[test]
    fn set_palette_skips_closed_device_and_empty_palette() {
        let device = FakeDevice::vga16(8, 1);
        let mut palette = Palette::new();

        set_palette(Some(&device), &palette);
        assert!(device.uploaded_palettes().is_empty());

        palette.lookup(0xFF00FF00);
        set_palette(None::<&FakeDevice>, &palette);
        assert!(device.uploaded_palettes().is_empty());

        set_palette(Some(&device), &palette);
        assert_eq!(device.uploaded_palettes(), vec![palette]);
    }
}
