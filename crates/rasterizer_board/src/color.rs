use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorError {
    #[error("empty color value")]
    Empty,
    #[error("invalid hex color {0:?}")]
    InvalidHex(String),
}

/// 24-bit RGB color, always rendered in the canonical `#RRGGBB` form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Builds a color from loosely typed channel inputs, clamping each to `0..=255`.
    pub fn from_channels(r: i64, g: i64, b: i64) -> Self {
        let clamp = |value: i64| value.clamp(0, 255) as u8;
        Self::new(clamp(r), clamp(g), clamp(b))
    }

    /// Parses any accepted hex spelling: optional `#`, 3-digit shorthand, any case.
    ///
    /// Inputs longer than six digits are truncated to the first six.
    pub fn parse_hex(input: &str) -> Result<Self, ColorError> {
        let trimmed = input.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(ColorError::Empty);
        }

        let invalid = || ColorError::InvalidHex(input.to_string());

        let expanded: String = if digits.len() == 3 {
            digits.chars().flat_map(|ch| [ch, ch]).collect()
        } else {
            digits.get(..6).ok_or_else(invalid)?.to_string()
        };

        if !expanded.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let value = u32::from_str_radix(&expanded, 16).map_err(|_| invalid())?;
        Ok(Self::from_u32(value))
    }

    pub const fn from_u32(value: u32) -> Self {
        Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub fn rgb(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Canonical `#RRGGBB` form.
    pub fn to_hex(self) -> String {
        self.to_string()
    }

    /// Six uppercase hex digits without the leading `#`.
    pub fn hex_digits(self) -> String {
        format!("{:06X}", self.to_u32())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Color::parse_hex(&raw).map_err(D::Error::custom)
    }
}
