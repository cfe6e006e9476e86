/// Largest side of the intermediate raster.
pub const MAX_RASTER_SIDE: u32 = 4096;

/// Pixel geometry of the intermediate raster rendered for a cell grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterGeometry {
    pub columns: u16,
    pub rows: u16,
    pub width: u32,
    pub height: u32,
}

impl RasterGeometry {
    /// Derives the raster size for `scale` pixels per cell. The scale need not be an
    /// integer but must be at least one.
    pub fn derive(columns: u16, rows: u16, scale: f32) -> Option<Self> {
        if columns == 0 || rows == 0 || !scale.is_finite() || scale < 1.0 {
            return None;
        }

        let width = (f32::from(columns) * scale).round() as u32;
        let height = (f32::from(rows) * scale).round() as u32;
        if width > MAX_RASTER_SIDE || height > MAX_RASTER_SIDE {
            return None;
        }

        Some(Self { columns, rows, width, height })
    }

    pub fn scale_x(&self) -> f32 {
        self.width as f32 / f32::from(self.columns)
    }

    pub fn scale_y(&self) -> f32 {
        self.height as f32 / f32::from(self.rows)
    }

    /// Half-open pixel ranges `(x0..x1, y0..y1)` covered by a cell. Never empty.
    pub fn cell_region(&self, column: u16, row: u16) -> ((u32, u32), (u32, u32)) {
        (
            span(column, self.scale_x(), self.width),
            span(row, self.scale_y(), self.height),
        )
    }

    /// Pixel nearest to the center of a cell.
    pub fn cell_center(&self, column: u16, row: u16) -> (u32, u32) {
        let x = ((f32::from(column) + 0.5) * self.scale_x()) as u32;
        let y = ((f32::from(row) + 0.5) * self.scale_y()) as u32;
        (x.min(self.width - 1), y.min(self.height - 1))
    }

    /// Continuous cell-space coordinate of a pixel center.
    pub fn to_cell_space(&self, x: u32, y: u32) -> (f32, f32) {
        ((x as f32 + 0.5) / self.scale_x(), (y as f32 + 0.5) / self.scale_y())
    }
}

fn span(index: u16, scale: f32, limit: u32) -> (u32, u32) {
    let start = ((f32::from(index) * scale).floor() as u32).min(limit - 1);
    let end = ((f32::from(index + 1) * scale).floor() as u32).clamp(start + 1, limit);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_scales() {
        assert!(RasterGeometry::derive(64, 32, 0.5).is_none());
        assert!(RasterGeometry::derive(64, 32, f32::NAN).is_none());
        assert!(RasterGeometry::derive(64, 32, 100.0).is_none());
        assert!(RasterGeometry::derive(0, 32, 2.0).is_none());
    }

    #[test]
    fn regions_tile_the_raster() {
        let geometry = RasterGeometry::derive(64, 32, 2.5).unwrap();
        assert_eq!((geometry.width, geometry.height), (160, 80));

        let mut next = 0;
        for column in 0..64 {
            let ((x0, x1), _) = geometry.cell_region(column, 0);
            assert_eq!(x0, next);
            assert!(x1 > x0);
            next = x1;
        }
        assert_eq!(next, 160);
    }

    #[test]
    fn center_of_integer_scale() {
        let geometry = RasterGeometry::derive(4, 2, 4.0).unwrap();
        assert_eq!(geometry.cell_center(1, 1), (6, 6));
        assert_eq!(geometry.to_cell_space(6, 6), (1.625, 1.625));
    }
}
