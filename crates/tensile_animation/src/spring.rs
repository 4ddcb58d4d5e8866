//! Spring values
//!
//! A [`SpringValue`] drives one animated value toward a goal. It owns the
//! current components, velocity and goal, the resolved [`SpringConfig`], a
//! lifecycle [`Phase`] and its listeners.
//!
//! Calls on a spring only mutate state and queue notifications; the
//! frameloop integrates and then delivers them in order (start, change,
//! rest, cancel) on its next tick. Starting a spring that is already moving
//! retargets it: the new goal replaces the old one and the current velocity
//! carries over, so motion stays continuous.
//!
//! ```ignore
//! let x = SpringValue::new(frameloop(), 0.0, SpringConfig::wobbly());
//! x.on_rest(|event| println!("settled at {}", event.value));
//! let done = x.start(100.0)?;
//! ```

use crate::completion::{AnimationResult, Completion, CompletionSender};
use crate::config::{PartialConfig, SpringConfig};
use crate::error::AnimationError;
use crate::frameloop::{FrameInfo, FrameLoopHandle, FrameTarget, SpringId};
use crate::integrator::{self, Lanes};
use crate::listener::{emit, ListenerId, Listeners};
use crate::value::{AnimValue, Shape};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Lifecycle phase of a spring
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Created or stopped; not moving
    Idle,
    /// Integrated every frame
    Running,
    /// Frozen mid-flight; goal and velocity are kept
    Paused,
    /// Reached its goal
    Resting,
}

/// Payload delivered to spring listeners
#[derive(Clone, Debug, PartialEq)]
pub struct SpringEvent {
    pub value: AnimValue,
    /// Controller key, when the spring belongs to one
    pub key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EventKind {
    Start,
    Change,
    Rest,
    Cancel,
}

struct SpringState {
    id: SpringId,
    key: Option<String>,
    shape: Shape,
    value: Lanes,
    velocity: Lanes,
    goal: Lanes,
    config: SpringConfig,
    precision: f32,
    phase: Phase,
    ticks: u32,
    stall_warned: bool,
    /// Value moved outside of integration (set/finish)
    dirty: bool,
    queued: Vec<(EventKind, AnimValue)>,
    pending: Vec<CompletionSender<AnimValue>>,
    resolved: Vec<(CompletionSender<AnimValue>, AnimationResult<AnimValue>)>,
}

impl SpringState {
    fn current(&self) -> AnimValue {
        AnimValue::from_components(self.shape, &integrator::narrow(&self.value))
    }

    fn target(&self) -> AnimValue {
        AnimValue::from_components(self.shape, &integrator::narrow(&self.goal))
    }

    fn distance(&self) -> f32 {
        integrator::distance(&self.value, &self.goal) as f32
    }

    fn in_flight(&self) -> bool {
        matches!(self.phase, Phase::Running | Phase::Paused)
    }

    fn retarget(&mut self, goal: Lanes) {
        self.goal = goal;
        self.precision = self.config.precision_for(self.distance());
    }

    /// Resolve in-flight completions as cancelled and queue the cancel event
    fn cancel(&mut self) {
        let value = self.current();
        self.queued.retain(|(kind, _)| *kind != EventKind::Change);
        self.queued.push((EventKind::Cancel, value.clone()));
        for tx in self.pending.drain(..) {
            self.resolved
                .push((tx, AnimationResult::cancelled(value.clone())));
        }
    }
}

struct SpringShared {
    state: RefCell<SpringState>,
    listeners: RefCell<Listeners<SpringEvent, EventKind>>,
    handle: FrameLoopHandle,
}

impl FrameTarget for SpringShared {
    fn advance(&self, frame: &FrameInfo) -> bool {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let mut changed = std::mem::take(&mut state.dirty);

        if state.phase != Phase::Running {
            if changed {
                let value = state.current();
                state.queued.push((EventKind::Change, value));
            }
            return false;
        }

        state.ticks += 1;
        let before = state.current();
        let outcome = integrator::step(
            &mut state.value,
            &mut state.velocity,
            &state.goal,
            &state.config,
            state.precision,
            frame.dt,
        );
        let value = state.current();
        changed |= value != before;
        if changed {
            state.queued.push((EventKind::Change, value.clone()));
        }

        if outcome.settled {
            state.phase = Phase::Resting;
            state.queued.push((EventKind::Rest, value.clone()));
            for tx in state.pending.drain(..) {
                state
                    .resolved
                    .push((tx, AnimationResult::finished(value.clone())));
            }
            return false;
        }

        if state.ticks >= frame.stall_tick_limit && !state.stall_warned {
            state.stall_warned = true;
            tracing::warn!(
                "Spring {:?} still moving after {} ticks (value {}, goal {}), check its config",
                state.key.as_deref().unwrap_or("<unkeyed>"),
                state.ticks,
                value,
                state.target()
            );
        }
        true
    }

    fn flush(&self) {
        let (queued, resolved, key) = {
            let mut state = self.state.borrow_mut();
            (
                std::mem::take(&mut state.queued),
                std::mem::take(&mut state.resolved),
                state.key.clone(),
            )
        };

        for (kind, value) in queued {
            let listeners = self.listeners.borrow().snapshot(kind);
            let event = SpringEvent {
                value,
                key: key.clone(),
            };
            emit(listeners, &event);
        }

        for (tx, result) in resolved {
            // The receiver may already be gone
            let _ = tx.send(result);
        }
    }
}

impl Drop for SpringShared {
    fn drop(&mut self) {
        let id = self.state.get_mut().id;
        self.handle.remove(id);
    }
}

/// A physically animated value
///
/// Clones share the same spring. The spring is detached from its frameloop
/// once every clone is dropped; unresolved completions then report
/// cancellation.
#[derive(Clone)]
pub struct SpringValue {
    shared: Rc<SpringShared>,
}

impl SpringValue {
    /// Create an idle spring at `initial`
    pub fn new(handle: FrameLoopHandle, initial: impl Into<AnimValue>, config: SpringConfig) -> Self {
        let initial = initial.into();
        let value = integrator::widen(&initial.components());
        let shared = Rc::new(SpringShared {
            state: RefCell::new(SpringState {
                id: SpringId::default(),
                key: None,
                shape: initial.shape(),
                velocity: smallvec::smallvec![0.0; value.len()],
                goal: value.clone(),
                value,
                precision: config.precision_for(0.0),
                config,
                phase: Phase::Idle,
                ticks: 0,
                stall_warned: false,
                dirty: false,
                queued: Vec::new(),
                pending: Vec::new(),
                resolved: Vec::new(),
            }),
            listeners: RefCell::new(Listeners::new()),
            handle: handle.clone(),
        });

        let weak: Weak<SpringShared> = Rc::downgrade(&shared);
        match handle.insert(weak) {
            Some(id) => shared.state.borrow_mut().id = id,
            None => tracing::warn!("Spring created against a dropped frameloop"),
        }
        Self { shared }
    }

    /// Create an idle spring with the default config
    pub fn with_default(handle: FrameLoopHandle, initial: impl Into<AnimValue>) -> Self {
        Self::new(handle, initial, SpringConfig::default())
    }

    /// Tag events from this spring with a key (builder pattern)
    pub fn with_key(self, key: impl Into<String>) -> Self {
        self.shared.state.borrow_mut().key = Some(key.into());
        self
    }

    /// Animate toward `goal`
    ///
    /// The returned completion resolves once the spring rests (finished) or
    /// is stopped (cancelled). A goal already within precision of a spring
    /// at rest changes nothing and resolves immediately.
    pub fn start(&self, goal: impl Into<AnimValue>) -> Result<Completion<AnimValue>, AnimationError> {
        let goal = goal.into();
        let mut state = self.shared.state.borrow_mut();
        if goal.shape() != state.shape {
            return Err(AnimationError::ShapeMismatch {
                expected: state.shape,
                found: goal.shape(),
            });
        }
        if !self.shared.handle.is_alive() {
            return Err(AnimationError::Detached);
        }

        let goal = integrator::widen(&goal.components());
        let current = state.current();
        let phase = state.phase;
        match phase {
            Phase::Running | Phase::Paused => {
                state.retarget(goal);
                let (tx, completion) = Completion::channel(current);
                state.pending.push(tx);
                Ok(completion)
            }
            Phase::Idle | Phase::Resting => {
                let distance = integrator::distance(&state.value, &goal);
                let precision = integrator::settle_precision(
                    state.config.precision_for(distance as f32),
                    &state.value,
                    &goal,
                );
                let moving = state.velocity.iter().any(|v| v.abs() >= precision);
                if distance < precision && !moving {
                    return Ok(Completion::ready(AnimationResult::finished(current)));
                }

                state.retarget(goal);
                state.phase = Phase::Running;
                state.ticks = 0;
                state.stall_warned = false;
                let target = state.target();
                state.queued.push((EventKind::Start, target));
                let (tx, completion) = Completion::channel(current);
                state.pending.push(tx);

                let id = state.id;
                drop(state);
                self.shared.handle.register(id)?;
                Ok(completion)
            }
        }
    }

    /// Merge `overrides` into the current config, then start
    pub fn start_with(
        &self,
        goal: impl Into<AnimValue>,
        overrides: &PartialConfig,
    ) -> Result<Completion<AnimValue>, AnimationError> {
        let config = PartialConfig::from(self.config()).merge(overrides).resolve()?;
        self.set_config(config);
        self.start(goal)
    }

    /// Freeze at the current value
    ///
    /// In-flight motion is cancelled: `on_cancel` fires and pending
    /// completions resolve as cancelled on the next tick. No further change
    /// events are delivered.
    pub fn stop(&self) {
        let mut state = self.shared.state.borrow_mut();
        let was_in_flight = state.in_flight();
        state.velocity.fill(0.0);
        state.goal = state.value.clone();
        state.phase = Phase::Idle;
        if !was_in_flight {
            return;
        }

        state.dirty = false;
        state.cancel();
        let id = state.id;
        drop(state);
        // Registering only to deliver the cancel; a dead frameloop has no one to tell
        let _ = self.shared.handle.register(id);
    }

    /// Freeze integration, keeping goal and velocity
    pub fn pause(&self) {
        let mut state = self.shared.state.borrow_mut();
        if state.phase == Phase::Running {
            state.phase = Phase::Paused;
        }
    }

    /// Continue a paused spring
    pub fn resume(&self) {
        let mut state = self.shared.state.borrow_mut();
        if state.phase != Phase::Paused {
            return;
        }
        state.phase = Phase::Running;
        let id = state.id;
        drop(state);
        if let Err(err) = self.shared.handle.register(id) {
            tracing::warn!("Cannot resume spring: {}", err);
        }
    }

    /// Jump to `value` with zero velocity, without animating
    pub fn set(&self, value: impl Into<AnimValue>) -> Result<(), AnimationError> {
        let value = value.into();
        let mut state = self.shared.state.borrow_mut();
        if value.shape() != state.shape {
            return Err(AnimationError::ShapeMismatch {
                expected: state.shape,
                found: value.shape(),
            });
        }

        if state.in_flight() {
            state.cancel();
        }
        state.value = integrator::widen(&value.components());
        state.goal = state.value.clone();
        state.velocity.fill(0.0);
        state.phase = Phase::Idle;
        state.dirty = true;
        let id = state.id;
        drop(state);
        // Without a frameloop the jump still applies; only the event is lost
        let _ = self.shared.handle.register(id);
        Ok(())
    }

    /// Snap to the goal; rest is delivered on the next tick
    pub fn finish(&self) {
        let mut state = self.shared.state.borrow_mut();
        if !state.in_flight() {
            return;
        }
        state.value = state.goal.clone();
        state.velocity.fill(0.0);
        state.phase = Phase::Running;
        state.dirty = true;
        let id = state.id;
        drop(state);
        if let Err(err) = self.shared.handle.register(id) {
            tracing::warn!("Cannot finish spring: {}", err);
        }
    }

    /// Replace the config used from the next tick on
    pub fn set_config(&self, config: SpringConfig) {
        let mut state = self.shared.state.borrow_mut();
        state.config = config;
        state.precision = config.precision_for(state.distance());
    }

    pub fn get(&self) -> AnimValue {
        self.shared.state.borrow().current()
    }

    pub fn velocity(&self) -> AnimValue {
        let state = self.shared.state.borrow();
        AnimValue::from_components(state.shape, &integrator::narrow(&state.velocity))
    }

    pub fn goal(&self) -> AnimValue {
        self.shared.state.borrow().target()
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    /// Running or paused mid-flight
    pub fn is_animating(&self) -> bool {
        self.shared.state.borrow().in_flight()
    }

    pub fn config(&self) -> SpringConfig {
        self.shared.state.borrow().config
    }

    pub fn shape(&self) -> Shape {
        self.shared.state.borrow().shape
    }

    pub fn key(&self) -> Option<String> {
        self.shared.state.borrow().key.clone()
    }

    pub fn id(&self) -> SpringId {
        self.shared.state.borrow().id
    }

    /// Whether two handles refer to the same spring
    pub fn ptr_eq(&self, other: &SpringValue) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn on_start(&self, f: impl Fn(&SpringEvent) + 'static) -> ListenerId {
        self.shared.listeners.borrow_mut().add(EventKind::Start, f)
    }

    pub fn on_change(&self, f: impl Fn(&SpringEvent) + 'static) -> ListenerId {
        self.shared.listeners.borrow_mut().add(EventKind::Change, f)
    }

    pub fn on_rest(&self, f: impl Fn(&SpringEvent) + 'static) -> ListenerId {
        self.shared.listeners.borrow_mut().add(EventKind::Rest, f)
    }

    pub fn on_cancel(&self, f: impl Fn(&SpringEvent) + 'static) -> ListenerId {
        self.shared.listeners.borrow_mut().add(EventKind::Cancel, f)
    }

    /// Remove a listener registered with any `on_*` method
    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.listeners.borrow_mut().remove(id)
    }
}

impl fmt::Debug for SpringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("SpringValue")
            .field("key", &state.key)
            .field("phase", &state.phase)
            .field("value", &state.current())
            .field("goal", &state.target())
            .finish()
    }
}
