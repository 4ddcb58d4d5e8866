//! Error types for the animation engine

use crate::value::Shape;
use thiserror::Error;

/// Errors produced while resolving a spring configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Spring {field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },

    #[error("Failed to parse spring config: {0}")]
    Parse(String),

    #[error("Failed to read spring config: {0}")]
    Io(String),
}

/// Errors produced when starting or updating an animation
///
/// Failures are always local to one key: a rejected key never prevents its
/// siblings in the same controller from animating.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnimationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Goal shape {found} does not match spring shape {expected}")]
    ShapeMismatch { expected: Shape, found: Shape },

    #[error("Invalid interpolation range: {0}")]
    InvalidRange(String),

    #[error("Frameloop has been dropped")]
    Detached,
}
