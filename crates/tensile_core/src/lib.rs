//! Tensile Core
//!
//! Value primitives shared by the Tensile spring engine and its consumers:
//!
//! - **Color**: RGBA color with hex parsing and CSS `rgba()` formatting
//! - **Vectors**: `Vec2` and `Vec3` for positions, scales and offsets
//!
//! The animation crate flattens these into component lists for integration
//! and rebuilds them in the same shape on output.

pub mod color;
pub mod geometry;

pub use color::{Color, ColorParseError};
pub use geometry::{Vec2, Vec3};
