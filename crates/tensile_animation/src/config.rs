//! Spring configuration
//!
//! A [`SpringConfig`] is the fully resolved set of integration parameters for
//! one key. Callers usually describe dynamics with a [`PartialConfig`] (any
//! subset of fields, a named preset, or a damping ratio) and let
//! [`ConfigSource`] resolve it per key at update time.
//!
//! Malformed input never raises: non-finite numbers and unknown preset names
//! fall back to defaults with a warning. Finite but non-positive parameters
//! are rejected with [`ConfigError::NonPositive`], since the integrator is
//! undefined for them.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;

pub const DEFAULT_MASS: f32 = 1.0;
pub const DEFAULT_TENSION: f32 = 170.0;
pub const DEFAULT_FRICTION: f32 = 26.0;
pub const DEFAULT_PRECISION: f32 = 0.01;

/// Lower bound for derived precision; finer thresholds drown in f32 noise
pub const MIN_PRECISION: f32 = 1e-5;

/// Resolved configuration for a spring
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringConfig {
    pub mass: f32,
    pub tension: f32,
    pub friction: f32,
    /// Settle threshold for position and velocity; derived from the
    /// travel distance when unset
    pub precision: Option<f32>,
    /// Stop at the goal instead of overshooting it
    pub clamp: bool,
    /// Jump straight to the goal without integrating
    pub immediate: bool,
}

impl SpringConfig {
    /// Create a new spring configuration
    pub fn new(tension: f32, friction: f32, mass: f32) -> Self {
        Self {
            mass,
            tension,
            friction,
            precision: None,
            clamp: false,
            immediate: false,
        }
    }

    /// A gentle, slow spring (good for page transitions)
    pub fn gentle() -> Self {
        Self::new(120.0, 14.0, 1.0)
    }

    /// A wobbly spring with overshoot (good for playful UI)
    pub fn wobbly() -> Self {
        Self::new(180.0, 12.0, 1.0)
    }

    /// A stiff, snappy spring (good for buttons)
    pub fn stiff() -> Self {
        Self::new(210.0, 20.0, 1.0)
    }

    /// A slow, heavily damped spring
    pub fn slow() -> Self {
        Self::new(280.0, 60.0, 1.0)
    }

    /// A very slow spring with no overshoot
    pub fn molasses() -> Self {
        Self::new(280.0, 120.0, 1.0)
    }

    /// Spring with exactly critical friction: fastest settle without overshoot
    pub fn critically_damped(tension: f32, mass: f32) -> Self {
        Self::from_damping_ratio(1.0, tension, mass)
    }

    /// Derive friction from a damping ratio (1.0 = critical, < 1.0 oscillates)
    pub fn from_damping_ratio(ratio: f32, tension: f32, mass: f32) -> Self {
        let friction = ratio * 2.0 * (tension * mass).sqrt();
        Self::new(tension, friction, mass)
    }

    pub fn with_precision(mut self, precision: f32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp = clamp;
        self
    }

    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Friction at which this spring is critically damped
    pub fn critical_friction(&self) -> f32 {
        2.0 * (self.tension * self.mass).sqrt()
    }

    pub fn damping_ratio(&self) -> f32 {
        self.friction / self.critical_friction()
    }

    /// Check if the spring is underdamped (will oscillate)
    pub fn is_underdamped(&self) -> bool {
        self.friction < self.critical_friction()
    }

    /// Check if the spring is critically damped (no oscillation, fastest settling)
    pub fn is_critically_damped(&self) -> bool {
        (self.friction - self.critical_friction()).abs() < 0.01
    }

    /// Check if the spring is overdamped (slow settling, no oscillation)
    pub fn is_overdamped(&self) -> bool {
        self.friction > self.critical_friction()
    }

    /// Reject parameters the integrator cannot handle
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("mass", self.mass),
            ("tension", self.tension),
            ("friction", self.friction),
        ];
        for (field, value) in checks {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if let Some(precision) = self.precision {
            if precision.is_nan() || precision <= 0.0 {
                return Err(ConfigError::NonPositive {
                    field: "precision",
                    value: precision,
                });
            }
        }
        Ok(())
    }

    /// Settle threshold for a motion covering `distance`
    ///
    /// Sub-unit ranges get a proportionally finer threshold so the final
    /// snap to the goal stays invisible.
    pub fn precision_for(&self, distance: f32) -> f32 {
        match self.precision {
            Some(p) => p,
            None => DEFAULT_PRECISION.min(distance * 0.001).max(MIN_PRECISION),
        }
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TENSION, DEFAULT_FRICTION, DEFAULT_MASS)
    }
}

// ============================================================================
// Presets
// ============================================================================

/// Named spring presets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Default,
    Gentle,
    Wobbly,
    Stiff,
    Slow,
    Molasses,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::Default,
        Preset::Gentle,
        Preset::Wobbly,
        Preset::Stiff,
        Preset::Slow,
        Preset::Molasses,
    ];

    pub fn config(&self) -> SpringConfig {
        match self {
            Preset::Default => SpringConfig::default(),
            Preset::Gentle => SpringConfig::gentle(),
            Preset::Wobbly => SpringConfig::wobbly(),
            Preset::Stiff => SpringConfig::stiff(),
            Preset::Slow => SpringConfig::slow(),
            Preset::Molasses => SpringConfig::molasses(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Default => "default",
            Preset::Gentle => "gentle",
            Preset::Wobbly => "wobbly",
            Preset::Stiff => "stiff",
            Preset::Slow => "slow",
            Preset::Molasses => "molasses",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::Parse(format!("unknown spring preset '{s}'")))
    }
}

// ============================================================================
// Partial configuration
// ============================================================================

/// Raw, all-optional spring configuration as written by callers or config files
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    pub preset: Option<String>,
    pub mass: Option<f32>,
    pub tension: Option<f32>,
    pub friction: Option<f32>,
    /// Alternative to `friction`: fraction of critical damping
    pub damping_ratio: Option<f32>,
    pub precision: Option<f32>,
    pub clamp: Option<bool>,
    pub immediate: Option<bool>,
}

impl PartialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset.name().to_string());
        self
    }

    pub fn mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn tension(mut self, tension: f32) -> Self {
        self.tension = Some(tension);
        self
    }

    pub fn friction(mut self, friction: f32) -> Self {
        self.friction = Some(friction);
        self
    }

    pub fn damping_ratio(mut self, ratio: f32) -> Self {
        self.damping_ratio = Some(ratio);
        self
    }

    pub fn precision(mut self, precision: f32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn clamp(mut self, clamp: bool) -> Self {
        self.clamp = Some(clamp);
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = Some(immediate);
        self
    }

    /// Layer `other` on top of `self`; fields set in `other` win
    pub fn merge(&self, other: &PartialConfig) -> PartialConfig {
        // An explicit friction on either side beats a ratio from the other
        let (friction, damping_ratio) = match (other.friction, other.damping_ratio) {
            (None, None) => (self.friction, self.damping_ratio),
            (f, r) => (f, r),
        };
        PartialConfig {
            preset: other.preset.clone().or_else(|| self.preset.clone()),
            mass: other.mass.or(self.mass),
            tension: other.tension.or(self.tension),
            friction,
            damping_ratio,
            precision: other.precision.or(self.precision),
            clamp: other.clamp.or(self.clamp),
            immediate: other.immediate.or(self.immediate),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == PartialConfig::default()
    }

    /// Parse a single `[table]` worth of config from TOML
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolve against presets and library defaults
    pub fn resolve(&self) -> Result<SpringConfig, ConfigError> {
        let base = match self.preset.as_deref() {
            Some(name) => match name.parse::<Preset>() {
                Ok(preset) => preset.config(),
                Err(_) => {
                    tracing::warn!("Unknown spring preset '{}', using defaults", name);
                    SpringConfig::default()
                }
            },
            None => SpringConfig::default(),
        };

        let mass = finite_or("mass", self.mass, base.mass);
        let tension = finite_or("tension", self.tension, base.tension);
        let friction = match (self.friction, self.damping_ratio) {
            (Some(_), _) => finite_or("friction", self.friction, base.friction),
            (None, Some(ratio)) if ratio.is_finite() => {
                if ratio < 0.0 {
                    return Err(ConfigError::NonPositive {
                        field: "damping_ratio",
                        value: ratio,
                    });
                }
                ratio * 2.0 * (tension * mass).sqrt()
            }
            (None, Some(ratio)) => {
                tracing::warn!("Ignoring non-finite spring damping_ratio {}", ratio);
                base.friction
            }
            (None, None) => base.friction,
        };
        let precision = match self.precision {
            Some(p) if !p.is_finite() => {
                tracing::warn!("Ignoring non-finite spring precision {}", p);
                base.precision
            }
            Some(p) => Some(p),
            None => base.precision,
        };

        let config = SpringConfig {
            mass,
            tension,
            friction,
            precision,
            clamp: self.clamp.unwrap_or(base.clamp),
            immediate: self.immediate.unwrap_or(base.immediate),
        };
        config.validate()?;
        Ok(config)
    }
}

fn finite_or(field: &str, value: Option<f32>, fallback: f32) -> f32 {
    match value {
        Some(v) if v.is_finite() => v,
        Some(v) => {
            tracing::warn!("Ignoring non-finite spring {} {}, using {}", field, v, fallback);
            fallback
        }
        None => fallback,
    }
}

impl From<SpringConfig> for PartialConfig {
    fn from(config: SpringConfig) -> Self {
        Self {
            preset: None,
            mass: Some(config.mass),
            tension: Some(config.tension),
            friction: Some(config.friction),
            damping_ratio: None,
            precision: config.precision,
            clamp: Some(config.clamp),
            immediate: Some(config.immediate),
        }
    }
}

impl From<Preset> for PartialConfig {
    fn from(preset: Preset) -> Self {
        PartialConfig::new().preset(preset)
    }
}

// ============================================================================
// Config sources
// ============================================================================

/// Per-key configuration function
pub type KeyConfigFn = Rc<dyn Fn(&str) -> PartialConfig>;

/// Where a controller gets each key's configuration from
///
/// Either one literal for every key, or a function of the key so different
/// properties in one controller can have different dynamics. Resolved once per
/// key at update time.
#[derive(Clone)]
pub enum ConfigSource {
    Uniform(PartialConfig),
    PerKey(KeyConfigFn),
}

impl ConfigSource {
    pub fn uniform(config: impl Into<PartialConfig>) -> Self {
        ConfigSource::Uniform(config.into())
    }

    pub fn per_key<F>(f: F) -> Self
    where
        F: Fn(&str) -> PartialConfig + 'static,
    {
        ConfigSource::PerKey(Rc::new(f))
    }

    /// Raw configuration for `key`
    pub fn partial_for(&self, key: &str) -> PartialConfig {
        match self {
            ConfigSource::Uniform(config) => config.clone(),
            ConfigSource::PerKey(f) => f(key),
        }
    }

    /// Resolved configuration for `key`
    pub fn resolve(&self, key: &str) -> Result<SpringConfig, ConfigError> {
        self.partial_for(key).resolve()
    }
}

/// Resolve the configuration for `key` from `source`
pub fn resolve(key: &str, source: &ConfigSource) -> Result<SpringConfig, ConfigError> {
    source.resolve(key)
}

impl Default for ConfigSource {
    fn default() -> Self {
        ConfigSource::Uniform(PartialConfig::default())
    }
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Uniform(config) => f.debug_tuple("Uniform").field(config).finish(),
            ConfigSource::PerKey(_) => f.write_str("PerKey(..)"),
        }
    }
}

impl From<PartialConfig> for ConfigSource {
    fn from(config: PartialConfig) -> Self {
        ConfigSource::Uniform(config)
    }
}

impl From<SpringConfig> for ConfigSource {
    fn from(config: SpringConfig) -> Self {
        ConfigSource::Uniform(config.into())
    }
}

impl From<Preset> for ConfigSource {
    fn from(preset: Preset) -> Self {
        ConfigSource::Uniform(preset.into())
    }
}

// ============================================================================
// Config files
// ============================================================================

/// Spring configuration document
///
/// ```toml
/// [default]
/// preset = "gentle"
///
/// [keys.scale]
/// tension = 400.0
/// friction = 30.0
/// clamp = true
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub default: PartialConfig,
    #[serde(default)]
    pub keys: BTreeMap<String, PartialConfig>,
}

impl ConfigFile {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse, falling back to an empty document on malformed input
    pub fn parse_or_default(s: &str) -> Self {
        Self::from_toml_str(s).unwrap_or_else(|e| {
            tracing::warn!("{}; falling back to default spring config", e);
            Self::default()
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Raw configuration for `key`: the key's table layered over `[default]`
    pub fn partial_for(&self, key: &str) -> PartialConfig {
        match self.keys.get(key) {
            Some(overrides) => self.default.merge(overrides),
            None => self.default.clone(),
        }
    }

    /// Resolve `[default]` and every listed key
    pub fn resolve_all(&self) -> Vec<(String, Result<SpringConfig, ConfigError>)> {
        std::iter::once(("default".to_string(), self.default.resolve()))
            .chain(
                self.keys
                    .keys()
                    .map(|key| (key.clone(), self.partial_for(key).resolve())),
            )
            .collect()
    }

    /// Convert into a per-key lookup table
    pub fn into_source(self) -> ConfigSource {
        let file = Rc::new(self);
        ConfigSource::per_key(move |key| file.partial_for(key))
    }
}
