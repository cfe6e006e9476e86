use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::color::Color;
use crate::grid::PixelGrid;
use crate::BoardError;

pub const DEFAULT_EXPORT_NAME: &str = "font64x32";
pub const DEFAULT_BOARD_EXPORT_NAME: &str = "font64x32-board";
pub const BOARD_FILE_EXTENSION: &str = "board.json";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    /// Header plus rows of space-separated `RRGGBB` codes.
    #[default]
    Plain,
    /// C source declaring a `uint32_t` array.
    SourceArray,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Plain => "txt",
            ExportFormat::SourceArray => "c",
        }
    }

    pub fn render(self, grid: &PixelGrid) -> String {
        match self {
            ExportFormat::Plain => to_plain(grid),
            ExportFormat::SourceArray => to_source_array(grid),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = BoardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" | "txt" => Ok(ExportFormat::Plain),
            "c" | "c-array" | "source" => Ok(ExportFormat::SourceArray),
            other => Err(BoardError::Validation(format!("unknown export format {other:?}"))),
        }
    }
}

pub fn to_plain(grid: &PixelGrid) -> String {
    let (width, height) = (grid.width(), grid.height());
    let mut out = format!("FONT{width}x{height} RGB888\nWIDTH {width}\nHEIGHT {height}\nDATA\n");
    for row in grid.rows() {
        let line: Vec<String> = row.iter().map(|color| color.hex_digits()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

/// Reads back the output of [`to_plain`].
pub fn parse_plain(text: &str) -> Result<PixelGrid, BoardError> {
    let invalid = |message: String| BoardError::Validation(message);
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    let header = lines.next().ok_or_else(|| invalid("empty export".into()))?;
    if !header.starts_with("FONT") {
        return Err(invalid(format!("unexpected header {header:?}")));
    }

    let width = header_value(lines.next(), "WIDTH")?;
    let height = header_value(lines.next(), "HEIGHT")?;
    if width == 0 || height == 0 {
        return Err(invalid(format!("empty grid {width}x{height}")));
    }
    if lines.next() != Some("DATA") {
        return Err(invalid("missing DATA marker".into()));
    }

    let mut rows = Vec::with_capacity(usize::from(height));
    for (index, line) in lines.enumerate() {
        let row = line
            .split_whitespace()
            .map(Color::parse_hex)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| invalid(format!("data row {}: {err}", index + 1)))?;
        rows.push(row);
    }

    PixelGrid::from_rows(width, height, &rows).ok_or_else(|| {
        invalid(format!("expected {height} rows of {width} colors, found {} rows", rows.len()))
    })
}

pub fn to_source_array(grid: &PixelGrid) -> String {
    let (width, height) = (grid.width(), grid.height());
    let mut out = format!("const uint32_t FONT_{width}x{height}[{height}][{width}] = {{\n");
    for row in grid.rows() {
        let values: Vec<String> = row.iter().map(|color| format!("0x{}", color.hex_digits())).collect();
        let _ = writeln!(out, "    {{ {} }},", values.join(", "));
    }
    out.push_str("};\n");
    out
}

/// Keeps `[A-Za-z0-9_-]`, replacing everything else with `_`. Blank names yield `None`.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let sanitized = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    Some(sanitized)
}

/// `<base>-<timestamp>.<extension>` with the RFC 3339 timestamp made filesystem safe.
pub fn export_file_name(base: &str, fallback: &str, extension: &str, now: DateTime<Utc>) -> String {
    let base = sanitize_file_name(base).unwrap_or_else(|| fallback.to_string());
    let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true).replace([':', '.'], "-");
    format!("{base}-{stamp}.{extension}")
}

fn header_value(line: Option<&str>, key: &str) -> Result<u16, BoardError> {
    line.and_then(|line| line.strip_prefix(key))
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| BoardError::Validation(format!("missing or invalid {key} line")))
}
