use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("glyph definition needs a character line and at least two data rows, found {0} lines")]
    TooFewLines(usize),
    #[error("first line {0:?} is not a single glyph character")]
    InvalidCharacter(String),
    #[error("cannot parse data row {line:?}: {reason}")]
    InvalidRow { line: String, reason: String },
}

/// Bitmap font character. Each row is a run of bytes; every byte covers eight columns with
/// the most significant bit leftmost.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glyph {
    #[serde(rename = "char")]
    pub character: String,
    pub rows: Vec<Vec<u8>>,
}

impl Glyph {
    /// Widest row in columns.
    pub fn width(&self) -> usize {
        self.rows.iter().map(|row| row.len() * 8).max().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_set(&self, column: usize, row: usize) -> bool {
        self.rows
            .get(row)
            .and_then(|bytes| bytes.get(column / 8))
            .is_some_and(|byte| byte & (0x80 >> (column % 8)) != 0)
    }

    /// `(column, row)` of every painted bit. Rows keep their own width.
    pub fn set_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, bytes)| {
            (0..bytes.len() * 8)
                .filter(move |&column| bytes[column / 8] & (0x80 >> (column % 8)) != 0)
                .map(move |column| (column, row))
        })
    }
}

/// Lookup used when text elements are rasterized.
pub trait GlyphSource {
    fn glyph_for(&self, ch: char) -> Option<&Glyph>;
}

/// Glyph source that resolves nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGlyphs;

impl GlyphSource for NoGlyphs {
    fn glyph_for(&self, _ch: char) -> Option<&Glyph> {
        None
    }
}

impl GlyphSource for [Glyph] {
    fn glyph_for(&self, ch: char) -> Option<&Glyph> {
        self.iter().rev().find(|glyph| glyph.character.chars().eq(std::iter::once(ch)))
    }
}

impl GlyphSource for Vec<Glyph> {
    fn glyph_for(&self, ch: char) -> Option<&Glyph> {
        self.as_slice().glyph_for(ch)
    }
}

/// Parses a glyph definition: a character line (optionally `c(index)`) followed by one
/// `{0x.., 0x..}` byte list per row.
pub fn parse(text: &str) -> Result<Glyph, FormatError> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
    if lines.len() < 3 {
        return Err(FormatError::TooFewLines(lines.len()));
    }

    let character = parse_character(lines[0])?;
    let rows = lines[1..].iter().map(|line| parse_row(line)).collect::<Result<_, _>>()?;

    Ok(Glyph { character, rows })
}

fn parse_character(line: &str) -> Result<String, FormatError> {
    let token = strip_index(line).unwrap_or(line);
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch.to_string()),
        _ => Err(FormatError::InvalidCharacter(line.to_string())),
    }
}

/// `A (12)` -> `A`; `None` when there is no trailing parenthesized index.
fn strip_index(line: &str) -> Option<&str> {
    let inner = line.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let index = &inner[open + 1..];
    if index.is_empty() || !index.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    let head = inner[..open].trim_end();
    (!head.is_empty()).then_some(head)
}

fn parse_row(line: &str) -> Result<Vec<u8>, FormatError> {
    let invalid = |reason: String| FormatError::InvalidRow { line: line.to_string(), reason };

    let open = line.find('{').ok_or_else(|| invalid("missing `{`".into()))?;
    let close = line[open..].find('}').ok_or_else(|| invalid("missing `}`".into()))? + open;

    line[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
                return Err(invalid(format!("bad hex byte {token:?}")));
            }
            u8::from_str_radix(digits, 16).map_err(|_| invalid(format!("bad hex byte {token:?}")))
        })
        .collect()
}
