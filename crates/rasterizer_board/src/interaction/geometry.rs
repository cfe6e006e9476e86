use crate::element::{Element, Shape};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in surface units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SurfaceRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl SurfaceRect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    pub fn intersects(&self, other: &SurfaceRect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    fn centered_at(point: Point, size: f32) -> Self {
        Self::new(point.x - size / 2.0, point.y - size / 2.0, size, size)
    }
}

/// Resize grips around a selected element, clockwise from the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Handle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::TopLeft,
        Handle::Top,
        Handle::TopRight,
        Handle::Right,
        Handle::BottomRight,
        Handle::Bottom,
        Handle::BottomLeft,
        Handle::Left,
    ];

    pub fn is_corner(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::TopRight | Handle::BottomRight | Handle::BottomLeft)
    }

    /// Where the handle sits on `bounds`.
    pub fn position(self, bounds: &SurfaceRect) -> Point {
        let (fx, fy) = self.factors();
        Point::new(bounds.x + bounds.w * fx, bounds.y + bounds.h * fy)
    }

    pub fn hit_box(self, bounds: &SurfaceRect, size: f32) -> SurfaceRect {
        SurfaceRect::centered_at(self.position(bounds), size)
    }

    /// Applies a pointer delta to `original`, moving only the edges this handle controls and
    /// never letting either dimension drop below `min_size`.
    pub fn resize(self, original: &SurfaceRect, dx: f32, dy: f32, min_size: f32) -> SurfaceRect {
        let (fx, fy) = self.factors();
        let mut left = original.x;
        let mut right = original.right();
        let mut top = original.y;
        let mut bottom = original.bottom();

        if fx == 0.0 {
            left = (left + dx).min(right - min_size);
        } else if fx == 1.0 {
            right = (right + dx).max(left + min_size);
        }

        if fy == 0.0 {
            top = (top + dy).min(bottom - min_size);
        } else if fy == 1.0 {
            bottom = (bottom + dy).max(top + min_size);
        }

        SurfaceRect::new(left, top, right - left, bottom - top)
    }

    fn factors(self) -> (f32, f32) {
        match self {
            Handle::TopLeft => (0.0, 0.0),
            Handle::Top => (0.5, 0.0),
            Handle::TopRight => (1.0, 0.0),
            Handle::Right => (1.0, 0.5),
            Handle::BottomRight => (1.0, 1.0),
            Handle::Bottom => (0.5, 1.0),
            Handle::BottomLeft => (0.0, 1.0),
            Handle::Left => (0.0, 0.5),
        }
    }
}

/// Maps grid cells onto the continuous drawing surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Surface {
    pub columns: u16,
    pub rows: u16,
    /// Surface units per grid cell.
    pub cell_size: f32,
}

impl Surface {
    pub fn width(&self) -> f32 {
        f32::from(self.columns) * self.cell_size
    }

    pub fn height(&self) -> f32 {
        f32::from(self.rows) * self.cell_size
    }

    /// On-surface footprint of an element.
    ///
    /// Circles cover their whole inclusive radius; text is `font_size` tall and
    /// `font_size` wide per character.
    pub fn element_bounds(&self, element: &Element) -> SurfaceRect {
        let cell = self.cell_size;
        match element.shape {
            Shape::Rectangle { x, y, w, h } => SurfaceRect::new(
                offset(x) * cell,
                offset(y) * cell,
                w as f32 * cell,
                h as f32 * cell,
            ),
            Shape::Circle { cx, cy, r } => {
                let r = r as f32;
                SurfaceRect::new(
                    (offset(cx) - r) * cell,
                    (offset(cy) - r) * cell,
                    (2.0 * r + 1.0) * cell,
                    (2.0 * r + 1.0) * cell,
                )
            },
            Shape::Text { ref text, x, y, font_size } => {
                let chars = text.chars().count().max(1) as f32;
                SurfaceRect::new(offset(x) * cell, offset(y) * cell, font_size * chars, font_size)
            },
        }
    }

    /// 1-indexed cell containing the surface coordinate, clamped to at least 1.
    pub fn cell_at(&self, units: f32) -> u32 {
        ((units / self.cell_size).floor() as i64 + 1).max(1) as u32
    }

    /// Whole number of cells spanned by a length, at least one.
    pub fn cell_span(&self, units: f32) -> u32 {
        ((units / self.cell_size).round() as i64).max(1) as u32
    }
}

fn offset(position: u32) -> f32 {
    position as f32 - 1.0
}
