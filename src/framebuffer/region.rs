//! Dirty-region tracking as a set of rectangles

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rectangles: Vec<Rectangle>,
}

impl Region {
    pub const fn new() -> Self {
        Self {
            rectangles: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rectangles.is_empty()
    }

    /// Union a rectangle into the region.
    ///
    /// Rectangles already covered by the region are dropped and rectangles
    /// covered by the new one are absorbed. A rectangle sharing a full edge
    /// span with a stored one (same rows and touching columns, or the
    /// reverse) is merged into it, so pixel-by-pixel drawing collapses into
    /// rows and then blocks. Other partial overlaps are kept as-is;
    /// flushing a pixel twice is harmless.
    pub fn add_rectangle(&mut self, rect: &Rectangle) {
        if rect.is_zero_sized() {
            return;
        }

        if self.rectangles.iter().any(|r| covers(r, rect)) {
            return;
        }

        let mut rect = *rect;
        while let Some(index) = self.rectangles.iter().position(|r| joins(r, &rect)) {
            let neighbour = self.rectangles.swap_remove(index);
            rect = bounding_box(&neighbour, &rect);
        }

        self.rectangles.retain(|r| !covers(&rect, r));
        self.rectangles.push(rect);
    }

    pub fn len(&self) -> usize {
        self.rectangles.len()
    }

    /// Rectangles ordered top to bottom, then left to right.
    pub fn sorted_rectangles(&self) -> Vec<Rectangle> {
        let mut sorted = self.rectangles.clone();
        sorted.sort_by_key(|r| (r.top_left.y, r.top_left.x));
        sorted
    }

    pub fn clear(&mut self) {
        self.rectangles.clear();
    }
}

fn covers(outer: &Rectangle, inner: &Rectangle) -> bool {
    outer.intersection(inner) == *inner
}

/// Whether the union of `a` and `b` is exactly their bounding box
fn joins(a: &Rectangle, b: &Rectangle) -> bool {
    let (ax, ay) = (a.top_left.x as i64, a.top_left.y as i64);
    let (bx, by) = (b.top_left.x as i64, b.top_left.y as i64);
    let (aw, ah) = (a.size.width as i64, a.size.height as i64);
    let (bw, bh) = (b.size.width as i64, b.size.height as i64);

    let same_rows = ay == by && ah == bh && ax <= bx + bw && bx <= ax + aw;
    let same_columns = ax == bx && aw == bw && ay <= by + bh && by <= ay + ah;
    same_rows || same_columns
}

fn bounding_box(a: &Rectangle, b: &Rectangle) -> Rectangle {
    let right = |r: &Rectangle| r.top_left.x as i64 + r.size.width as i64;
    let bottom = |r: &Rectangle| r.top_left.y as i64 + r.size.height as i64;

    let top_left = a.top_left.component_min(b.top_left);
    let width = right(a).max(right(b)) - top_left.x as i64;
    let height = bottom(a).max(bottom(b)) - top_left.y as i64;
    Rectangle::new(top_left, Size::new(width as u32, height as u32))
}
