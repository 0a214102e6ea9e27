//! Packed ARGB pixel buffer using embedded-graphics
use crate::devices::framebuffer::color::Color;
use crate::framebuffer::region::Region;
use embedded_graphics::{pixelcolor::Rgb888, prelude::*, primitives::Rectangle};

/// Software surface backing a head: one `0xAARRGGBB` word per pixel.
///
/// Every write adds the touched area to `updated_areas`, which the flush
/// path drains.
pub struct PixelBuffer {
    pixels: Vec<u32>,
    pub width: usize,
    pub height: usize,
    updated_areas: Region,
}

impl PixelBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            pixels: vec![0; width * height],
            width,
            height,
            updated_areas: Region::new(),
        }
    }

    pub fn bounds(&self) -> Rectangle {
        Rectangle::new(Point::zero(), self.size())
    }

    pub fn argb32_data(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, argb: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.pixels[y * self.width + x] = argb;
        self.updated_areas.add_rectangle(&Rectangle::new(
            Point::new(x as i32, y as i32),
            Size::new(1, 1),
        ));
    }

    /// Fill `area` (or the whole buffer) with a raw ARGB value
    pub fn fill_with_hex_color(&mut self, area: Option<&Rectangle>, argb: u32) {
        let area = match area {
            Some(area) => area.intersection(&self.bounds()),
            None => self.bounds(),
        };
        if area.is_zero_sized() {
            return;
        }

        let x1 = area.top_left.x as usize;
        let x2 = x1 + area.size.width as usize;
        for y in area.rows() {
            let row = y as usize * self.width;
            self.pixels[row + x1..row + x2].fill(argb);
        }

        self.updated_areas.add_rectangle(&area);
    }

    /// Fill with a color given as unit-range channels; the stored value is
    /// alpha-premultiplied.
    pub fn fill_with_color(
        &mut self,
        area: Option<&Rectangle>,
        red: f64,
        green: f64,
        blue: f64,
        alpha: f64,
    ) {
        let channel = |value: f64| (value * 255.0).round().clamp(0.0, 255.0) as u8;
        let color = Color::with_alpha(
            channel(red * alpha),
            channel(green * alpha),
            channel(blue * alpha),
            channel(alpha),
        );
        self.fill_with_hex_color(area, color.to_argb());
    }

    pub fn updated_areas(&self) -> &Region {
        &self.updated_areas
    }

    pub fn updated_areas_mut(&mut self) -> &mut Region {
        &mut self.updated_areas
    }
}

// Implement DrawTarget for embedded-graphics
impl DrawTarget for PixelBuffer {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let mut touched: Option<(Point, Point)> = None;

        for Pixel(point, color) in pixels {
            let Point { x, y } = point;
            if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
                continue;
            }

            self.pixels[y as usize * self.width + x as usize] = Color::from_rgb888(color).to_argb();

            touched = Some(match touched {
                None => (point, point),
                Some((min, max)) => (min.component_min(point), max.component_max(point)),
            });
        }

        if let Some((min, max)) = touched {
            self.updated_areas
                .add_rectangle(&Rectangle::with_corners(min, max));
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_with_hex_color(Some(area), Color::from_rgb888(color).to_argb());
        Ok(())
    }
}

impl OriginDimensions for PixelBuffer {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{Line, PrimitiveStyle};

    #[test]
    fn fill_with_color_premultiplies_alpha() {
        let mut buffer = PixelBuffer::new(2, 2);
        buffer.fill_with_color(None, 1.0, 0.5, 0.0, 1.0);
        assert_eq!(buffer.pixel(1, 1), Some(0xFFFF8000));

        buffer.fill_with_color(None, 1.0, 1.0, 1.0, 0.0);
        assert_eq!(buffer.pixel(0, 0), Some(0x0000_0000));
    }

    #[test]
    fn fill_is_clipped_and_marks_dirty() {
        let mut buffer = PixelBuffer::new(4, 4);
        let area = Rectangle::new(Point::new(2, 2), Size::new(10, 10));
        buffer.fill_with_hex_color(Some(&area), 0xFF00FF00);

        assert_eq!(buffer.pixel(3, 3), Some(0xFF00FF00));
        assert_eq!(buffer.pixel(1, 1), Some(0));
        assert_eq!(
            buffer.updated_areas().sorted_rectangles(),
            vec![Rectangle::new(Point::new(2, 2), Size::new(2, 2))]
        );
    }

    #[test]
    fn drawing_marks_bounding_box() {
        let mut buffer = PixelBuffer::new(8, 8);
        Line::new(Point::new(1, 6), Point::new(5, 2))
            .into_styled(PrimitiveStyle::with_stroke(Rgb888::new(0x12, 0x34, 0x56), 1))
            .draw(&mut buffer)
            .ok();

        assert_eq!(buffer.pixel(1, 6), Some(0xFF123456));
        assert_eq!(
            buffer.updated_areas().sorted_rectangles(),
            vec![Rectangle::with_corners(Point::new(1, 2), Point::new(5, 6))]
        );
    }

    #[test]
    fn pixel_by_pixel_row_is_one_rectangle() {
        let mut buffer = PixelBuffer::new(16, 4);
        for x in 0..16 {
            buffer.set_pixel(x, 2, 0xFFFFFFFF);
        }
        assert_eq!(
            buffer.updated_areas().sorted_rectangles(),
            vec![Rectangle::new(Point::new(0, 2), Size::new(16, 1))]
        );
    }

    #[test]
    fn pixel_by_pixel_surface_stays_compact() {
        let mut buffer = PixelBuffer::new(160, 120);
        for y in 0..120 {
            for x in 0..160 {
                buffer.set_pixel(x, y, 0xFF000000 | (x * y) as u32);
            }
        }
        assert_eq!(buffer.updated_areas().sorted_rectangles(), vec![buffer.bounds()]);

        let mut by_columns = PixelBuffer::new(8, 8);
        for x in 0..8 {
            for y in 0..8 {
                by_columns.set_pixel(x, y, 0xFFFFFFFF);
            }
        }
        assert_eq!(by_columns.updated_areas().len(), 1);
    }

    #[test]
    fn out_of_bounds_pixels_are_ignored() {
        let mut buffer = PixelBuffer::new(2, 2);
        buffer.set_pixel(5, 0, 0xFFFFFFFF);
        assert!(buffer.updated_areas().is_empty());
        assert_eq!(buffer.pixel(5, 0), None);
    }
}
