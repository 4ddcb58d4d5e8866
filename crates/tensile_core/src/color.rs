//! RGBA colors
//!
//! Channels are stored as `f32` in `0.0..=1.0`. Springs animate each channel
//! independently, so intermediate values may briefly leave that range on
//! underdamped configs; [`Color::clamped`] brings them back for painting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when parsing a color string
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("Color string must start with '#': {0}")]
    MissingHash(String),

    #[error("Color string has invalid length {len}: {input}")]
    InvalidLength { input: String, len: usize },

    #[error("Invalid hex digit in color: {0}")]
    InvalidDigit(String),
}

/// RGBA color
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "default_alpha")]
    pub a: f32,
}

fn default_alpha() -> f32 {
    1.0
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Build from a packed `0xRRGGBB` value
    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xFF) as f32 / 255.0;
        let g = ((hex >> 8) & 0xFF) as f32 / 255.0;
        let b = (hex & 0xFF) as f32 / 255.0;
        Self::rgb(r, g, b)
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.a = alpha;
        self
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_array(channels: [f32; 4]) -> Self {
        Self::rgba(channels[0], channels[1], channels[2], channels[3])
    }

    /// Copy with every channel clamped to `0.0..=1.0`
    pub fn clamped(&self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }

    /// Linear interpolation between two colors
    pub fn lerp(a: &Color, b: &Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        Color {
            r: a.r + (b.r - a.r) * t,
            g: a.g + (b.g - a.g) * t,
            b: a.b + (b.b - a.b) * t,
            a: a.a + (b.a - a.a) * t,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Formats as a CSS `rgba(r, g, b, a)` string with 0-255 channels
impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.clamped();
        write!(
            f,
            "rgba({}, {}, {}, {})",
            (c.r * 255.0).round() as u8,
            (c.g * 255.0).round() as u8,
            (c.b * 255.0).round() as u8,
            (c.a * 1000.0).round() / 1000.0
        )
    }
}

/// Parses `#rgb`, `#rrggbb` and `#rrggbbaa`
impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let digits = input
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError::MissingHash(input.to_string()))?;

        let parse = |hex: &str| {
            u8::from_str_radix(hex, 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| ColorParseError::InvalidDigit(input.to_string()))
        };

        match digits.len() {
            3 => {
                let mut channels = [0.0; 3];
                for (i, ch) in digits.chars().enumerate() {
                    let doubled: String = [ch, ch].iter().collect();
                    channels[i] = parse(&doubled)?;
                }
                Ok(Color::rgb(channels[0], channels[1], channels[2]))
            }
            6 | 8 => {
                if !digits.is_ascii() {
                    return Err(ColorParseError::InvalidDigit(input.to_string()));
                }
                let r = parse(&digits[0..2])?;
                let g = parse(&digits[2..4])?;
                let b = parse(&digits[4..6])?;
                let a = if digits.len() == 8 {
                    parse(&digits[6..8])?
                } else {
                    1.0
                };
                Ok(Color::rgba(r, g, b, a))
            }
            len => Err(ColorParseError::InvalidLength {
                input: input.to_string(),
                len,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        let short: Color = "#f00".parse().unwrap();
        assert_eq!(short, Color::RED);

        let long: Color = "#0000ff".parse().unwrap();
        assert_eq!(long, Color::BLUE);

        let with_alpha: Color = "#ffffff00".parse().unwrap();
        assert_eq!(with_alpha.a, 0.0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "fff".parse::<Color>(),
            Err(ColorParseError::MissingHash(_))
        ));
        assert!(matches!(
            "#ffff".parse::<Color>(),
            Err(ColorParseError::InvalidLength { len: 4, .. })
        ));
        assert!(matches!(
            "#gg0000".parse::<Color>(),
            Err(ColorParseError::InvalidDigit(_))
        ));
    }

    #[test]
    fn test_css_display() {
        assert_eq!(Color::RED.to_string(), "rgba(255, 0, 0, 1)");
        assert_eq!(
            Color::rgba(0.0, 0.5, 1.0, 0.25).to_string(),
            "rgba(0, 128, 255, 0.25)"
        );
        // Overshooting channels are clamped for output
        assert_eq!(Color::rgb(1.2, -0.1, 0.0).to_string(), "rgba(255, 0, 0, 1)");
    }

    #[test]
    fn test_lerp_midpoint() {
        let mid = Color::lerp(&Color::BLACK, &Color::WHITE, 0.5);
        assert!((mid.r - 0.5).abs() < 1e-6);
        assert!((mid.a - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_deserialize_default_alpha() {
        let color: Color = serde_json::from_str(r#"{"r": 1.0, "g": 0.0, "b": 0.0}"#).unwrap();
        assert_eq!(color, Color::RED);
    }
}
