use crate::color::Color;
use crate::grid::BACKGROUND;

use super::sample::Sample;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorBucket {
    White,
    Yellow,
    Magenta,
    Cyan,
    Red,
    Green,
    Blue,
    Orange,
}

impl ColorBucket {
    pub const ALL: [ColorBucket; 8] = [
        ColorBucket::White,
        ColorBucket::Yellow,
        ColorBucket::Magenta,
        ColorBucket::Cyan,
        ColorBucket::Red,
        ColorBucket::Green,
        ColorBucket::Blue,
        ColorBucket::Orange,
    ];

    /// Display color of the bucket on the matrix.
    pub fn color(self) -> Color {
        match self {
            ColorBucket::White => Color::new(255, 255, 255),
            ColorBucket::Yellow => Color::new(255, 255, 0),
            ColorBucket::Magenta => Color::new(255, 0, 255),
            ColorBucket::Cyan => Color::new(0, 255, 255),
            ColorBucket::Red => Color::new(255, 0, 0),
            ColorBucket::Green => Color::new(0, 255, 0),
            ColorBucket::Blue => Color::new(0, 0, 255),
            ColorBucket::Orange => Color::new(255, 165, 0),
        }
    }

    pub fn symbol(self) -> char {
        match self {
            ColorBucket::White => 'W',
            ColorBucket::Yellow => 'Y',
            ColorBucket::Magenta => 'M',
            ColorBucket::Cyan => 'C',
            ColorBucket::Red => 'R',
            ColorBucket::Green => 'G',
            ColorBucket::Blue => 'B',
            ColorBucket::Orange => 'O',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewCell {
    /// Dim or transparent: the LED stays dark.
    Off,
    Bucket(ColorBucket),
    /// No bucket fits, so the sampled color is shown as-is.
    Exact(Color),
}

impl PreviewCell {
    pub fn display_color(self) -> Color {
        match self {
            PreviewCell::Off => BACKGROUND,
            PreviewCell::Bucket(bucket) => bucket.color(),
            PreviewCell::Exact(color) => color,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            PreviewCell::Off => '.',
            PreviewCell::Bucket(bucket) => bucket.symbol(),
            PreviewCell::Exact(_) => '*',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    /// Coverage below this is treated as off.
    pub alpha: u8,
    /// Colors whose brightest channel is below this are treated as off.
    pub dark: u8,
    /// Channel values above this count as high.
    pub channel: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { alpha: 64, dark: 32, channel: 128 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewGrid {
    pub width: u16,
    pub height: u16,
    pub cells: Vec<PreviewCell>,
}

impl PreviewGrid {
    pub fn new(width: u16, height: u16, cells: Vec<PreviewCell>) -> Self {
        assert_eq!(usize::from(width) * usize::from(height), cells.len());
        Self { width, height, cells }
    }

    pub fn blank(width: u16, height: u16) -> Self {
        Self::new(width, height, vec![PreviewCell::Off; usize::from(width) * usize::from(height)])
    }

    pub fn get(&self, column: u16, row: u16) -> Option<PreviewCell> {
        if column >= self.width || row >= self.height {
            return None;
        }
        self.cells.get(usize::from(row) * usize::from(self.width) + usize::from(column)).copied()
    }

    /// One line of bucket symbols per row.
    pub fn rows(&self) -> impl Iterator<Item = String> + '_ {
        let width = self.width as usize;
        self.cells.chunks(width).map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
    }
}

pub struct Quantizer {
    thresholds: Thresholds,
}

impl Quantizer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn classify(&self, sample: Sample) -> PreviewCell {
        let Thresholds { alpha, dark, channel } = self.thresholds;
        let Color { r, g, b } = sample.color;

        if sample.alpha < alpha || r.max(g).max(b) < dark {
            return PreviewCell::Off;
        }

        if r > channel && (64..=192).contains(&g) && b <= 64 {
            return PreviewCell::Bucket(ColorBucket::Orange);
        }

        let bucket = match (r > channel, g > channel, b > channel) {
            (true, true, true) => ColorBucket::White,
            (true, true, false) => ColorBucket::Yellow,
            (true, false, true) => ColorBucket::Magenta,
            (false, true, true) => ColorBucket::Cyan,
            (true, false, false) => ColorBucket::Red,
            (false, true, false) => ColorBucket::Green,
            (false, false, true) => ColorBucket::Blue,
            (false, false, false) => return PreviewCell::Exact(sample.color),
        };
        PreviewCell::Bucket(bucket)
    }

    pub fn map_samples(&self, samples: &[Sample], width: u16, height: u16) -> PreviewGrid {
        let cells = samples.iter().map(|&sample| self.classify(sample)).collect();
        PreviewGrid::new(width, height, cells)
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(hex: &str) -> PreviewCell {
        Quantizer::default().classify(Sample::opaque(Color::parse_hex(hex).unwrap()))
    }

    #[test]
    fn primary_buckets() {
        assert_eq!(classify("#FFFFFF"), PreviewCell::Bucket(ColorBucket::White));
        assert_eq!(classify("#F0F000"), PreviewCell::Bucket(ColorBucket::Yellow));
        assert_eq!(classify("#C000C0"), PreviewCell::Bucket(ColorBucket::Magenta));
        assert_eq!(classify("#00FFFF"), PreviewCell::Bucket(ColorBucket::Cyan));
        assert_eq!(classify("#FF2020"), PreviewCell::Bucket(ColorBucket::Red));
        assert_eq!(classify("#00FF00"), PreviewCell::Bucket(ColorBucket::Green));
        assert_eq!(classify("#0000FF"), PreviewCell::Bucket(ColorBucket::Blue));
    }

    #[test]
    fn orange_wins_over_yellow_for_moderate_green() {
        assert_eq!(classify("#FFA500"), PreviewCell::Bucket(ColorBucket::Orange));
        assert_eq!(classify("#FFFF00"), PreviewCell::Bucket(ColorBucket::Yellow));
        assert_eq!(classify("#FF40A0"), PreviewCell::Bucket(ColorBucket::Magenta));
    }

    #[test]
    fn dark_or_faint_cells_are_off() {
        assert_eq!(classify("#101010"), PreviewCell::Off);
        let faint = Sample { color: Color::WHITE, alpha: 10 };
        assert_eq!(Quantizer::default().classify(faint), PreviewCell::Off);
    }

    #[test]
    fn unmatched_colors_fall_back_to_exact() {
        assert_eq!(classify("#606060"), PreviewCell::Exact(Color::new(0x60, 0x60, 0x60)));
    }

    #[test]
    fn grid_rows_render_symbols() {
        let grid = PreviewGrid::new(
            2,
            2,
            vec![
                PreviewCell::Off,
                PreviewCell::Bucket(ColorBucket::Red),
                PreviewCell::Exact(Color::new(1, 2, 3)),
                PreviewCell::Bucket(ColorBucket::Orange),
            ],
        );
        assert_eq!(grid.rows().collect::<Vec<_>>(), vec![".R", "*O"]);
        assert_eq!(grid.get(1, 1).unwrap().display_color(), Color::new(255, 165, 0));
        assert!(grid.get(2, 0).is_none());
    }
}
