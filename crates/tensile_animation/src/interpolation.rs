//! Derived values
//!
//! An [`Interpolation`] is a read-only value computed from one or more
//! springs. It subscribes to each dependency's change notifications and
//! recomputes in the same tick, so derived output never lags a frame
//! behind the springs it is built from.
//!
//! [`RangeMap`] and [`ColorRamp`] cover the common mappings: a numeric
//! range onto another, and a number onto a color gradient.

use crate::error::AnimationError;
use crate::listener::{emit, ListenerId, Listeners};
use crate::spring::SpringValue;
use crate::value::AnimValue;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tensile_core::Color;

type ComputeFn<T> = Box<dyn Fn(&[AnimValue]) -> T>;

struct InterpolationShared<T> {
    deps: Vec<SpringValue>,
    subscriptions: RefCell<Vec<ListenerId>>,
    compute: ComputeFn<T>,
    listeners: RefCell<Listeners<T>>,
}

impl<T> InterpolationShared<T> {
    fn compute(&self) -> T {
        let values: Vec<AnimValue> = self.deps.iter().map(SpringValue::get).collect();
        (self.compute)(&values)
    }
}

impl<T> Drop for InterpolationShared<T> {
    fn drop(&mut self) {
        for (dep, id) in self.deps.iter().zip(self.subscriptions.get_mut().drain(..)) {
            dep.off(id);
        }
    }
}

/// A value derived from one or more springs
///
/// Clones share the same subscriptions.
pub struct Interpolation<T> {
    shared: Rc<InterpolationShared<T>>,
}

impl<T: 'static> Interpolation<T> {
    /// Derive a value from `deps`, which are passed to `compute` in order
    pub fn new<I, F>(deps: I, compute: F) -> Self
    where
        I: IntoIterator<Item = SpringValue>,
        F: Fn(&[AnimValue]) -> T + 'static,
    {
        let shared = Rc::new(InterpolationShared {
            deps: deps.into_iter().collect(),
            subscriptions: RefCell::new(Vec::new()),
            compute: Box::new(compute),
            listeners: RefCell::new(Listeners::new()),
        });

        let subscriptions = shared
            .deps
            .iter()
            .map(|dep| {
                let weak = Rc::downgrade(&shared);
                dep.on_change(move |_| {
                    if let Some(shared) = weak.upgrade() {
                        let value = shared.compute();
                        let listeners = shared.listeners.borrow().snapshot(());
                        emit(listeners, &value);
                    }
                })
            })
            .collect();
        *shared.subscriptions.borrow_mut() = subscriptions;

        Self { shared }
    }

    /// Derive a value from a single spring
    pub fn map<F>(spring: &SpringValue, f: F) -> Self
    where
        F: Fn(&AnimValue) -> T + 'static,
    {
        Self::new([spring.clone()], move |values| f(&values[0]))
    }

    /// Current derived value
    pub fn get(&self) -> T {
        self.shared.compute()
    }

    /// Whether every dependency is at rest
    pub fn is_resting(&self) -> bool {
        !self.shared.deps.iter().any(SpringValue::is_animating)
    }

    pub fn deps(&self) -> &[SpringValue] {
        &self.shared.deps
    }

    /// Called with the recomputed value whenever a dependency changes
    pub fn on_change(&self, f: impl Fn(&T) + 'static) -> ListenerId {
        self.shared.listeners.borrow_mut().add((), f)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.listeners.borrow_mut().remove(id)
    }
}

impl Interpolation<f32> {
    /// Map a scalar spring through `range`
    ///
    /// Non-scalar springs read as zero.
    pub fn range(spring: &SpringValue, range: RangeMap) -> Self {
        Self::map(spring, move |value| range.map(value.as_number().unwrap_or(0.0)))
    }
}

impl Interpolation<Color> {
    /// Map a scalar spring through a color gradient
    pub fn ramp(spring: &SpringValue, ramp: ColorRamp) -> Self {
        Self::map(spring, move |value| ramp.sample(value.as_number().unwrap_or(0.0)))
    }
}

/// Derive a value from `deps`
pub fn derive<T, I, F>(deps: I, compute: F) -> Interpolation<T>
where
    T: 'static,
    I: IntoIterator<Item = SpringValue>,
    F: Fn(&[AnimValue]) -> T + 'static,
{
    Interpolation::new(deps, compute)
}

impl<T> Clone for Interpolation<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Interpolation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpolation")
            .field("deps", &self.shared.deps.len())
            .finish()
    }
}

// ============================================================================
// Range mapping
// ============================================================================

/// What a [`RangeMap`] does with input outside its range
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Extrapolate {
    /// Continue the slope of the nearest segment
    #[default]
    Extend,
    /// Hold the edge output
    Clamp,
    /// Pass the input through unchanged
    Identity,
}

/// Piecewise-linear mapping between numeric ranges
#[derive(Clone, Debug, PartialEq)]
pub struct RangeMap {
    input: Vec<f32>,
    output: Vec<f32>,
    left: Extrapolate,
    right: Extrapolate,
}

impl RangeMap {
    /// `input` must be strictly increasing and as long as `output`, with at
    /// least two points
    pub fn new(input: impl Into<Vec<f32>>, output: impl Into<Vec<f32>>) -> Result<Self, AnimationError> {
        let input = input.into();
        let output = output.into();
        if input.len() != output.len() {
            return Err(AnimationError::InvalidRange(format!(
                "{} input points but {} output points",
                input.len(),
                output.len()
            )));
        }
        if input.len() < 2 {
            return Err(AnimationError::InvalidRange(
                "at least two points are required".to_string(),
            ));
        }
        if input.iter().chain(&output).any(|v| !v.is_finite()) {
            return Err(AnimationError::InvalidRange(
                "points must be finite".to_string(),
            ));
        }
        if input.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnimationError::InvalidRange(
                "input must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            input,
            output,
            left: Extrapolate::Extend,
            right: Extrapolate::Extend,
        })
    }

    /// Same behavior on both sides (builder pattern)
    pub fn extrapolate(self, mode: Extrapolate) -> Self {
        self.extrapolate_left(mode).extrapolate_right(mode)
    }

    pub fn extrapolate_left(mut self, mode: Extrapolate) -> Self {
        self.left = mode;
        self
    }

    pub fn extrapolate_right(mut self, mode: Extrapolate) -> Self {
        self.right = mode;
        self
    }

    pub fn map(&self, x: f32) -> f32 {
        let last = self.input.len() - 1;
        if x < self.input[0] {
            return match self.left {
                Extrapolate::Clamp => self.output[0],
                Extrapolate::Identity => x,
                Extrapolate::Extend => self.segment(0, x),
            };
        }
        if x > self.input[last] {
            return match self.right {
                Extrapolate::Clamp => self.output[last],
                Extrapolate::Identity => x,
                Extrapolate::Extend => self.segment(last - 1, x),
            };
        }

        let index = self
            .input
            .windows(2)
            .position(|w| x <= w[1])
            .unwrap_or(last - 1);
        self.segment(index, x)
    }

    fn segment(&self, i: usize, x: f32) -> f32 {
        let (x0, x1) = (self.input[i], self.input[i + 1]);
        let (y0, y1) = (self.output[i], self.output[i + 1]);
        y0 + (x - x0) / (x1 - x0) * (y1 - y0)
    }
}

/// Color gradient sampled by a number
#[derive(Clone, Debug, PartialEq)]
pub struct ColorRamp {
    stops: Vec<(f32, Color)>,
}

impl ColorRamp {
    /// Stop positions must be finite and non-decreasing
    pub fn new(stops: impl Into<Vec<(f32, Color)>>) -> Result<Self, AnimationError> {
        let stops = stops.into();
        if stops.is_empty() {
            return Err(AnimationError::InvalidRange(
                "a color ramp needs at least one stop".to_string(),
            ));
        }
        if stops.iter().any(|(at, _)| !at.is_finite()) {
            return Err(AnimationError::InvalidRange(
                "stop positions must be finite".to_string(),
            ));
        }
        if stops.windows(2).any(|w| w[1].0 < w[0].0) {
            return Err(AnimationError::InvalidRange(
                "stop positions must not decrease".to_string(),
            ));
        }
        Ok(Self { stops })
    }

    /// Color at `x`, holding the edge colors outside the stops
    pub fn sample(&self, x: f32) -> Color {
        let first = self.stops[0];
        if x <= first.0 {
            return first.1;
        }
        for w in self.stops.windows(2) {
            let ((a, from), (b, to)) = (w[0], w[1]);
            if x <= b {
                let t = if b > a { (x - a) / (b - a) } else { 1.0 };
                return Color::lerp(&from, &to, t);
            }
        }
        self.stops[self.stops.len() - 1].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frameloop::FrameLoop;
    use std::cell::Cell;
    use std::time::Duration;

    const FRAME: Duration = Duration::from_micros(16_667);

    #[test]
    fn test_recomputes_within_the_same_tick() {
        let frameloop = FrameLoop::new();
        let x = SpringValue::with_default(frameloop.handle(), 0.0);
        let y = SpringValue::with_default(frameloop.handle(), 0.0);
        let sum = Interpolation::new([x.clone(), y.clone()], |values| {
            values.iter().filter_map(AnimValue::as_number).sum::<f32>()
        });

        let seen = Rc::new(Cell::new(0.0f32));
        let sink = seen.clone();
        sum.on_change(move |value| sink.set(*value));

        x.start(10.0).unwrap();
        y.start(20.0).unwrap();
        assert!(!sum.is_resting());

        frameloop.advance(FRAME);
        let expected = x.get().as_number().unwrap() + y.get().as_number().unwrap();
        assert_eq!(seen.get(), expected);
        assert_eq!(sum.get(), expected);

        while frameloop.advance(FRAME) {}
        assert!(sum.is_resting());
        assert_eq!(sum.get(), 30.0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let frameloop = FrameLoop::new();
        let x = SpringValue::with_default(frameloop.handle(), 0.0);
        let calls = Rc::new(Cell::new(0));
        {
            let doubled = Interpolation::map(&x, |v| v.as_number().unwrap_or(0.0) * 2.0);
            let calls = calls.clone();
            doubled.on_change(move |_| calls.set(calls.get() + 1));
        }
        x.start(1.0).unwrap();
        frameloop.advance(FRAME);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_range_map_extrapolation() {
        let range = RangeMap::new([0.0, 1.0], [0.0, 100.0]).unwrap();
        assert_eq!(range.map(0.5), 50.0);
        assert_eq!(range.map(2.0), 200.0);

        let clamped = range.clone().extrapolate(Extrapolate::Clamp);
        assert_eq!(clamped.map(2.0), 100.0);
        assert_eq!(clamped.map(-1.0), 0.0);

        let identity = range.extrapolate_left(Extrapolate::Identity);
        assert_eq!(identity.map(-3.0), -3.0);
        assert_eq!(identity.map(2.0), 200.0);
    }

    #[test]
    fn test_range_map_multiple_segments() {
        let range = RangeMap::new([0.0, 0.5, 1.0], [0.0, 1.0, 0.0]).unwrap();
        assert_eq!(range.map(0.25), 0.5);
        assert_eq!(range.map(0.75), 0.5);
        assert_eq!(range.map(1.0), 0.0);
    }

    #[test]
    fn test_range_map_rejects_bad_input() {
        assert!(RangeMap::new([0.0], [1.0]).is_err());
        assert!(RangeMap::new([0.0, 1.0], [1.0]).is_err());
        assert!(RangeMap::new([1.0, 0.0], [0.0, 1.0]).is_err());
        assert!(RangeMap::new([0.0, f32::NAN], [0.0, 1.0]).is_err());
    }

    #[test]
    fn test_color_ramp_samples() {
        let ramp = ColorRamp::new([(0.0, Color::BLACK), (1.0, Color::WHITE)]).unwrap();
        assert_eq!(ramp.sample(-1.0), Color::BLACK);
        assert_eq!(ramp.sample(0.5), Color::rgb(0.5, 0.5, 0.5));
        assert_eq!(ramp.sample(5.0), Color::WHITE);
        assert!(ColorRamp::new(Vec::new()).is_err());
    }

    #[test]
    fn test_range_interpolation_follows_spring() {
        let frameloop = FrameLoop::new();
        let progress = SpringValue::with_default(frameloop.handle(), 0.0);
        let width = Interpolation::range(
            &progress,
            RangeMap::new([0.0, 1.0], [100.0, 300.0]).unwrap(),
        );
        assert_eq!(width.get(), 100.0);
        progress.start(1.0).unwrap();
        while frameloop.advance(FRAME) {}
        assert_eq!(width.get(), 300.0);
    }
}
