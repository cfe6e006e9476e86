use log::debug;

use crate::color::Color;
use crate::element::{Element, ElementList, Shape};
use crate::glyph::{Glyph, GlyphSource};
use crate::grid::{PixelGrid, RasterTarget};

/// Rasterizes elements in cell space.
///
/// Elements are drawn in list order and every covered cell is overwritten, so the last
/// element wins wherever shapes overlap.
pub struct Compositor<'a, G: GlyphSource + ?Sized> {
    glyphs: &'a G,
}

impl<'a, G: GlyphSource + ?Sized> Compositor<'a, G> {
    pub fn new(glyphs: &'a G) -> Self {
        Self { glyphs }
    }

    /// Clears `grid` and redraws every element. The painted count is exact afterwards since
    /// all writes go through the grid's single mutation path.
    pub fn composite(&self, elements: &ElementList, grid: &mut PixelGrid) {
        grid.clear();
        self.draw_all(elements, grid);
        debug_assert_eq!(grid.painted_count(), grid.scan_painted());
    }

    /// Draws elements over whatever the target already holds.
    pub fn draw_all<'e, T, I>(&self, elements: I, target: &mut T)
    where
        T: RasterTarget + ?Sized,
        I: IntoIterator<Item = &'e Element>,
    {
        for element in elements {
            self.draw(element, target);
        }
    }

    pub fn draw<T: RasterTarget + ?Sized>(&self, element: &Element, target: &mut T) {
        let color = element.color;
        match element.shape {
            Shape::Rectangle { x, y, w, h } => fill_rectangle(target, x, y, w, h, color),
            Shape::Circle { cx, cy, r } => fill_circle(target, cx, cy, r, color),
            Shape::Text { ref text, x, y, .. } => {
                let row = i64::from(y) - 1;
                let mut column = i64::from(x) - 1;
                for ch in text.chars() {
                    match self.glyphs.glyph_for(ch) {
                        Some(glyph) => {
                            stamp_glyph(target, glyph, column, row, color);
                            column += glyph.width() as i64;
                        },
                        None => debug!("no glyph for {ch:?} in {}, skipping", element.id),
                    }
                }
            },
        }
    }
}

/// Composites `elements` onto a fresh `width × height` grid.
pub fn composite<G: GlyphSource + ?Sized>(
    elements: &ElementList,
    glyphs: &G,
    width: u16,
    height: u16,
) -> PixelGrid {
    let mut grid = PixelGrid::new(width, height);
    Compositor::new(glyphs).composite(elements, &mut grid);
    grid
}

/// Paints the set bits of `glyph` with its top-left at the 0-indexed `(column, row)`.
/// Clear bits leave the target untouched.
pub fn stamp_glyph<T: RasterTarget + ?Sized>(
    target: &mut T,
    glyph: &Glyph,
    column: i64,
    row: i64,
    color: Color,
) {
    for (dc, dr) in glyph.set_cells() {
        target.put_clipped(column + dc as i64, row + dr as i64, color);
    }
}

fn fill_rectangle<T: RasterTarget + ?Sized>(
    target: &mut T,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    color: Color,
) {
    let (width, height) = target.dimensions();
    let left = (i64::from(x) - 1).max(0);
    let top = (i64::from(y) - 1).max(0);
    let right = (i64::from(x) - 1 + i64::from(w)).min(i64::from(width));
    let bottom = (i64::from(y) - 1 + i64::from(h)).min(i64::from(height));

    for row in top..bottom {
        for column in left..right {
            target.put_clipped(column, row, color);
        }
    }
}

/// Paints every cell whose 1-indexed center lies on or inside the circle.
fn fill_circle<T: RasterTarget + ?Sized>(target: &mut T, cx: u32, cy: u32, r: u32, color: Color) {
    let (width, height) = target.dimensions();
    let (cx, cy, r) = (i64::from(cx), i64::from(cy), i64::from(r));
    // Squares of u32-range distances do not fit in i64.
    let radius_sq = i128::from(r) * i128::from(r);

    let top = (cy - 1 - r).max(0);
    let bottom = (cy - 1 + r).min(i64::from(height) - 1);
    let left = (cx - 1 - r).max(0);
    let right = (cx - 1 + r).min(i64::from(width) - 1);

    for row in top..=bottom {
        let dy = i128::from(row + 1 - cy);
        for column in left..=right {
            let dx = i128::from(column + 1 - cx);
            if dx * dx + dy * dy <= radius_sq {
                target.put_clipped(column, row, color);
            }
        }
    }
}
