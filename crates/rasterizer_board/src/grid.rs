use crate::color::Color;

pub const GRID_WIDTH: u16 = 64;
pub const GRID_HEIGHT: u16 = 32;

/// Color of an unpainted cell.
pub const BACKGROUND: Color = Color::BLACK;

/// Cell-space drawing surface shared by the canonical grid and preview fallbacks.
///
/// Coordinates are 0-indexed; writes outside the target are dropped.
pub trait RasterTarget {
    fn dimensions(&self) -> (u16, u16);
    fn put(&mut self, column: u16, row: u16, color: Color);

    fn put_clipped(&mut self, column: i64, row: i64, color: Color) {
        let (width, height) = self.dimensions();
        if (0..i64::from(width)).contains(&column) && (0..i64::from(height)).contains(&row) {
            self.put(column as u16, row as u16, color);
        }
    }
}

/// Fixed-size canonical raster.
///
/// Every write goes through [`PixelGrid::set`], which keeps the painted-cell
/// count in step with the cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    width: u16,
    height: u16,
    cells: Vec<Color>,
    painted: usize,
}

impl PixelGrid {
    pub fn new(width: u16, height: u16) -> Self {
        assert!(width > 0 && height > 0, "pixel grid must not be empty");
        let cells = vec![BACKGROUND; usize::from(width) * usize::from(height)];
        Self { width, height, cells, painted: 0 }
    }

    /// Builds a grid from row-major rows, or `None` when the shape is not `height` rows of
    /// `width` cells.
    pub fn from_rows(width: u16, height: u16, rows: &[Vec<Color>]) -> Option<Self> {
        if rows.len() != usize::from(height)
            || rows.iter().any(|row| row.len() != usize::from(width))
        {
            return None;
        }

        let mut grid = Self::new(width, height);
        for (row_index, row) in rows.iter().enumerate() {
            for (column, &color) in row.iter().enumerate() {
                grid.set(column as u16, row_index as u16, color);
            }
        }
        Some(grid)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn cells(&self) -> &[Color] {
        &self.cells
    }

    pub fn get(&self, column: u16, row: u16) -> Option<Color> {
        self.index(column, row).map(|index| self.cells[index])
    }

    /// Writes one cell and returns whether its color changed.
    pub fn set(&mut self, column: u16, row: u16, color: Color) -> bool {
        let Some(index) = self.index(column, row) else {
            return false;
        };

        let previous = std::mem::replace(&mut self.cells[index], color);
        if previous == color {
            return false;
        }

        match (previous == BACKGROUND, color == BACKGROUND) {
            (true, false) => self.painted += 1,
            (false, true) => self.painted = self.painted.saturating_sub(1),
            _ => (),
        }
        true
    }

    pub fn clear(&mut self) {
        self.cells.fill(BACKGROUND);
        self.painted = 0;
    }

    /// Number of cells holding a non-background color.
    pub fn painted_count(&self) -> usize {
        self.painted
    }

    /// Recounts painted cells from scratch.
    pub fn scan_painted(&self) -> usize {
        self.cells.iter().filter(|&&color| color != BACKGROUND).count()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Color]> + '_ {
        self.cells.chunks(usize::from(self.width))
    }

    pub fn to_rows(&self) -> Vec<Vec<Color>> {
        self.rows().map(<[Color]>::to_vec).collect()
    }

    fn index(&self, column: u16, row: u16) -> Option<usize> {
        (column < self.width && row < self.height)
            .then(|| usize::from(row) * usize::from(self.width) + usize::from(column))
    }
}

impl Default for PixelGrid {
    fn default() -> Self {
        Self::new(GRID_WIDTH, GRID_HEIGHT)
    }
}

impl RasterTarget for PixelGrid {
    fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn put(&mut self, column: u16, row: u16, color: Color) {
        self.set(column, row, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::new(255, 0, 0);

    #[test]
    fn incremental_count_matches_scan() {
        let mut grid = PixelGrid::new(8, 4);
        let ops = [
            (0, 0, RED),
            (0, 0, RED),
            (1, 0, Color::WHITE),
            (0, 0, BACKGROUND),
            (7, 3, RED),
            (7, 3, Color::WHITE),
            (1, 0, BACKGROUND),
            (1, 0, BACKGROUND),
            (9, 9, RED),
        ];

        for (column, row, color) in ops {
            grid.set(column, row, color);
            assert_eq!(grid.painted_count(), grid.scan_painted());
        }
        assert_eq!(grid.painted_count(), 1);
    }

    #[test]
    fn clipped_writes_are_ignored() {
        let mut grid = PixelGrid::new(4, 4);
        grid.put_clipped(-1, 0, RED);
        grid.put_clipped(0, 4, RED);
        grid.put_clipped(3, 3, RED);
        assert_eq!(grid.painted_count(), 1);
        assert_eq!(grid.get(3, 3), Some(RED));
    }

    #[test]
    fn from_rows_checks_shape() {
        let rows = vec![vec![RED, BACKGROUND], vec![BACKGROUND, RED]];
        let grid = PixelGrid::from_rows(2, 2, &rows).unwrap();
        assert_eq!(grid.painted_count(), 2);
        assert_eq!(grid.to_rows(), rows);

        assert!(PixelGrid::from_rows(3, 2, &rows).is_none());
        assert!(PixelGrid::from_rows(2, 2, &rows[..1]).is_none());
    }
}
