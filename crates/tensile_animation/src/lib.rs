//! Tensile Animation Engine
//!
//! Physics-based spring values, grouped controllers and the per-frame
//! scheduler that drives them.
//!
//! # Features
//!
//! - **Spring Physics**: mass-spring-damper motion integrated with fixed 1 ms
//!   semi-implicit Euler substeps, stable under jittery frame times
//! - **Interruptible**: retargeting a moving spring keeps its velocity
//! - **Any Shape**: numbers, vectors and colors animate component-wise
//! - **Controllers**: keyed groups of springs with per-key configuration,
//!   batched updates and completion futures
//! - **Frameloop**: lazy, injectable per-thread scheduler that integrates
//!   everything before notifying anyone
//! - **Derived Values**: interpolations recomputed in the same tick as
//!   their source springs
//! - **Declarative and Imperative**: render bindings and `SpringRef` handles
//!   over the same controller core
//! - **Config Files**: presets, damping ratios and per-key TOML tables

pub mod binding;
pub mod completion;
pub mod config;
pub mod controller;
pub mod error;
pub mod frameloop;
pub mod handle;
pub mod integrator;
pub mod interpolation;
mod listener;
pub mod spring;
pub mod value;

pub use binding::SpringBinding;
pub use completion::{AnimationResult, Completion};
pub use config::{resolve, ConfigFile, ConfigSource, PartialConfig, Preset, SpringConfig};
pub use controller::{Batch, Controller};
pub use error::{AnimationError, ConfigError};
pub use frameloop::{
    frameloop, set_frameloop, try_frameloop, with_frameloop, Clock, DriverSignal, FrameDriver,
    FrameInfo, FrameLoop, FrameLoopConfig, FrameLoopHandle, ManualClock, SpringId, SystemClock,
};
pub use handle::SpringRef;
pub use interpolation::{derive, ColorRamp, Extrapolate, Interpolation, RangeMap};
pub use listener::ListenerId;
pub use spring::{Phase, SpringEvent, SpringValue};
pub use value::{AnimValue, Components, Goals, Shape, Snapshot};

pub use tensile_core::{Color, Vec2, Vec3};
