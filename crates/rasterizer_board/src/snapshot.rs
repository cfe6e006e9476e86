use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::element::{Element, ElementList};
use crate::grid::{PixelGrid, BACKGROUND};
use crate::BoardError;

pub const SNAPSHOT_SCHEMA: &str = "rasterizer-board@1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDimensions {
    pub width: u16,
    pub height: u16,
}

/// Persisted board: the pixel grid plus the element list that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub grid: GridDimensions,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub current_color: Option<Color>,
    /// Row-major cells; `null` reads as the background color.
    pub pixels: Vec<Vec<Option<Color>>>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// Listing entry for a stored snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SnapshotSummary {
    /// Timestamp used for recency ordering.
    pub fn recency(&self) -> Option<DateTime<Utc>> {
        self.saved_at.or(self.created_at)
    }
}

impl Snapshot {
    pub fn capture(
        grid: &PixelGrid,
        elements: &ElementList,
        name: &str,
        current_color: Color,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            schema: SNAPSHOT_SCHEMA.to_string(),
            id: None,
            created_at: Some(now),
            saved_at: None,
            grid: GridDimensions { width: grid.width(), height: grid.height() },
            name: name.trim().to_string(),
            current_color: Some(current_color),
            pixels: grid.rows().map(|row| row.iter().copied().map(Some).collect()).collect(),
            elements: elements.as_slice().to_vec(),
        }
    }

    /// Parses and validates a snapshot file against the live grid size.
    pub fn from_json(text: &str, width: u16, height: u16) -> Result<Self, BoardError> {
        let snapshot: Snapshot = serde_json::from_str(text)
            .map_err(|err| BoardError::Validation(format!("malformed board file: {err}")))?;
        snapshot.validate(width, height)?;
        Ok(snapshot)
    }

    pub fn to_json_pretty(&self) -> Result<String, BoardError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hard gate for accepting a snapshot: matching grid size and exactly `height` rows of
    /// `width` pixels.
    pub fn validate(&self, width: u16, height: u16) -> Result<(), BoardError> {
        let GridDimensions { width: w, height: h } = self.grid;
        if (w, h) != (width, height) {
            return Err(BoardError::Validation(format!(
                "board is {w}x{h}, expected {width}x{height}"
            )));
        }

        if self.pixels.len() != usize::from(height) {
            return Err(BoardError::Validation(format!(
                "expected {height} pixel rows, found {}",
                self.pixels.len()
            )));
        }

        if let Some((index, row)) =
            self.pixels.iter().enumerate().find(|(_, row)| row.len() != usize::from(width))
        {
            return Err(BoardError::Validation(format!(
                "pixel row {} has {} entries, expected {width}",
                index + 1,
                row.len()
            )));
        }

        Ok(())
    }

    /// Pixel grid stored in the snapshot. Call [`Self::validate`] first.
    pub fn pixel_grid(&self) -> Result<PixelGrid, BoardError> {
        let rows: Vec<Vec<Color>> = self
            .pixels
            .iter()
            .map(|row| row.iter().map(|cell| cell.unwrap_or(BACKGROUND)).collect())
            .collect();
        PixelGrid::from_rows(self.grid.width, self.grid.height, &rows)
            .ok_or_else(|| BoardError::Validation("pixel data does not match grid size".into()))
    }

    pub fn summary(&self) -> Option<SnapshotSummary> {
        Some(SnapshotSummary {
            id: self.id.clone()?,
            name: self.name.clone(),
            created_at: self.created_at,
            saved_at: self.saved_at,
        })
    }
}

fn default_schema() -> String {
    SNAPSHOT_SCHEMA.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Shape;

    fn sample() -> Snapshot {
        let mut grid = PixelGrid::new(4, 2);
        grid.set(1, 1, Color::new(255, 0, 0));
        let mut elements = ElementList::new();
        elements.add(Shape::Circle { cx: 2, cy: 2, r: 1 }, Color::WHITE);
        Snapshot::capture(&grid, &elements, "  logo ", Color::WHITE, Utc::now())
    }

    #[test]
    fn json_round_trip_keeps_board_file_shape() {
        let snapshot = sample();
        let json = snapshot.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["schema"], SNAPSHOT_SCHEMA);
        assert_eq!(value["grid"]["width"], 4);
        assert_eq!(value["name"], "logo");
        assert_eq!(value["currentColor"], "#FFFFFF");
        assert_eq!(value["pixels"][1][1], "#FF0000");
        assert_eq!(value["elements"][0]["type"], "circle");
        assert!(value.get("id").is_none());

        assert_eq!(Snapshot::from_json(&json, 4, 2).unwrap(), snapshot);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let json = sample().to_json_pretty().unwrap();
        assert!(matches!(Snapshot::from_json(&json, 5, 2), Err(BoardError::Validation(_))));
    }

    #[test]
    fn ragged_pixels_are_rejected() {
        let mut snapshot = sample();
        snapshot.pixels[1].pop();
        assert!(matches!(snapshot.validate(4, 2), Err(BoardError::Validation(_))));

        let mut snapshot = sample();
        snapshot.pixels.pop();
        assert!(matches!(snapshot.validate(4, 2), Err(BoardError::Validation(_))));
    }

    #[test]
    fn null_pixels_read_as_background() {
        let json = r##"{"grid": {"width": 2, "height": 1}, "pixels": [[null, "#00ff00"]]}"##;
        let snapshot = Snapshot::from_json(json, 2, 1).unwrap();
        let grid = snapshot.pixel_grid().unwrap();
        assert_eq!(grid.get(0, 0), Some(BACKGROUND));
        assert_eq!(grid.get(1, 0), Some(Color::new(0, 255, 0)));
        assert_eq!(grid.painted_count(), 1);
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(matches!(Snapshot::from_json("{", 4, 2), Err(BoardError::Validation(_))));
        let bad_pixel = r##"{"grid": {"width": 1, "height": 1}, "pixels": [["#XYZXYZ"]]}"##;
        assert!(matches!(Snapshot::from_json(bad_pixel, 1, 1), Err(BoardError::Validation(_))));
    }
}
