//! Animatable value types
//!
//! Springs integrate flat component lists. [`AnimValue`] carries the shape a
//! caller supplied (scalar, vector, or color) so output is rebuilt in the same
//! shape the goal was given in.

use indexmap::IndexMap;
use smallvec::SmallVec;
use std::fmt;
use tensile_core::{Color, Vec2, Vec3};

/// Flat component storage for one animated value
pub type Components = SmallVec<[f32; 4]>;

/// Dimensionality of an animated value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    Number,
    Vector(usize),
    Color,
}

impl Shape {
    /// Number of integrated components
    pub fn len(&self) -> usize {
        match self {
            Shape::Number => 1,
            Shape::Vector(n) => *n,
            Shape::Color => 4,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Number => write!(f, "number"),
            Shape::Vector(n) => write!(f, "vector({n})"),
            Shape::Color => write!(f, "color"),
        }
    }
}

/// A value that can be driven by a spring
#[derive(Clone, Debug, PartialEq)]
pub enum AnimValue {
    Number(f32),
    Vector(Components),
    Color(Color),
}

impl AnimValue {
    pub fn shape(&self) -> Shape {
        match self {
            AnimValue::Number(_) => Shape::Number,
            AnimValue::Vector(c) => Shape::Vector(c.len()),
            AnimValue::Color(_) => Shape::Color,
        }
    }

    /// Flatten into integration components
    pub fn components(&self) -> Components {
        match self {
            AnimValue::Number(v) => smallvec::smallvec![*v],
            AnimValue::Vector(c) => c.clone(),
            AnimValue::Color(c) => Components::from_slice(&c.to_array()),
        }
    }

    /// Rebuild a value of `shape` from components
    ///
    /// Missing components read as zero so a short slice never panics.
    pub fn from_components(shape: Shape, components: &[f32]) -> Self {
        let at = |i: usize| components.get(i).copied().unwrap_or(0.0);
        match shape {
            Shape::Number => AnimValue::Number(at(0)),
            Shape::Vector(n) => AnimValue::Vector((0..n).map(at).collect()),
            Shape::Color => AnimValue::Color(Color::rgba(at(0), at(1), at(2), at(3))),
        }
    }

    /// Largest per-component distance to `other`, or `None` on shape mismatch
    pub fn distance(&self, other: &AnimValue) -> Option<f32> {
        if self.shape() != other.shape() {
            return None;
        }
        Some(max_distance(&self.components(), &other.components()))
    }

    pub fn as_number(&self) -> Option<f32> {
        match self {
            AnimValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            AnimValue::Vector(c) if c.len() == 2 => Some(Vec2::new(c[0], c[1])),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            AnimValue::Vector(c) if c.len() == 3 => Some(Vec3::new(c[0], c[1], c[2])),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            AnimValue::Color(c) => Some(*c),
            _ => None,
        }
    }
}

/// Largest absolute difference between two equally sized component lists
pub(crate) fn max_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

impl fmt::Display for AnimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnimValue::Number(v) => write!(f, "{v}"),
            AnimValue::Vector(c) => {
                write!(f, "(")?;
                for (i, v) in c.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            AnimValue::Color(c) => write!(f, "{c}"),
        }
    }
}

impl From<f32> for AnimValue {
    fn from(v: f32) -> Self {
        AnimValue::Number(v)
    }
}

// Unsuffixed float literals default to f64, so `spring.start(1.0)` needs these
impl From<f64> for AnimValue {
    fn from(v: f64) -> Self {
        AnimValue::Number(v as f32)
    }
}

impl<const N: usize> From<[f64; N]> for AnimValue {
    fn from(v: [f64; N]) -> Self {
        AnimValue::Vector(v.iter().map(|&c| c as f32).collect())
    }
}

impl From<(f64, f64)> for AnimValue {
    fn from((x, y): (f64, f64)) -> Self {
        AnimValue::Vector(smallvec::smallvec![x as f32, y as f32])
    }
}

impl<const N: usize> From<[f32; N]> for AnimValue {
    fn from(v: [f32; N]) -> Self {
        AnimValue::Vector(Components::from_slice(&v))
    }
}

impl From<(f32, f32)> for AnimValue {
    fn from((x, y): (f32, f32)) -> Self {
        AnimValue::Vector(smallvec::smallvec![x, y])
    }
}

impl From<(f32, f32, f32)> for AnimValue {
    fn from((x, y, z): (f32, f32, f32)) -> Self {
        AnimValue::Vector(smallvec::smallvec![x, y, z])
    }
}

impl From<Vec2> for AnimValue {
    fn from(v: Vec2) -> Self {
        AnimValue::Vector(Components::from_slice(&v.to_array()))
    }
}

impl From<Vec3> for AnimValue {
    fn from(v: Vec3) -> Self {
        AnimValue::Vector(Components::from_slice(&v.to_array()))
    }
}

impl From<Color> for AnimValue {
    fn from(c: Color) -> Self {
        AnimValue::Color(c)
    }
}

// ============================================================================
// Keyed collections
// ============================================================================

/// Goal values for a controller update, keyed by property name
///
/// Insertion order is preserved and drives the order springs are started in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Goals {
    entries: IndexMap<String, AnimValue>,
}

impl Goals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a goal (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AnimValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AnimValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AnimValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnimValue)> {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<AnimValue>> FromIterator<(K, V)> for Goals {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut goals = Goals::new();
        for (k, v) in iter {
            goals.insert(k, v);
        }
        goals
    }
}

impl<K: Into<String>, V: Into<AnimValue>, const N: usize> From<[(K, V); N]> for Goals {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl IntoIterator for Goals {
    type Item = (String, AnimValue);
    type IntoIter = indexmap::map::IntoIter<String, AnimValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Current values of every key in a controller
///
/// Plain values only, so observers syncing external state never hold on to
/// the springs themselves.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    values: IndexMap<String, AnimValue>,
}

impl Snapshot {
    pub(crate) fn from_map(values: IndexMap<String, AnimValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&AnimValue> {
        self.values.get(key)
    }

    /// Shortcut for scalar keys
    pub fn number(&self, key: &str) -> Option<f32> {
        self.get(key).and_then(AnimValue::as_number)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnimValue)> {
        self.values.iter()
    }
}
