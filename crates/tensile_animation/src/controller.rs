//! Controllers
//!
//! A [`Controller`] owns one [`SpringValue`] per key for a group of
//! properties updated together (a component's `x`, `y`, `opacity`...).
//! Updates resolve each key's config at update time, start every accepted
//! key within the same tick boundary and hand back a [`Batch`] whose
//! completion resolves once all of them have settled or been stopped.
//!
//! Failures are per key: a key whose config is invalid or whose goal has the
//! wrong shape is reported in [`Batch::rejected`] while its siblings animate.
//!
//! Controller listeners receive a [`Snapshot`] of every key. They run at
//! the end of a frame, after every spring notification of that frame, so
//! `on_change` fires at most once per frame however many keys moved.

use crate::completion::{AnimationResult, Completion, CompletionSender};
use crate::config::ConfigSource;
use crate::error::AnimationError;
use crate::frameloop::FrameLoopHandle;
use crate::listener::{emit, ListenerId, Listeners};
use crate::spring::SpringValue;
use crate::value::{AnimValue, Goals, Snapshot};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Result of a controller update
#[derive(Debug)]
pub struct Batch {
    /// Resolves with the controller snapshot once every accepted key is at
    /// rest; `cancelled` is set if any of them was stopped on the way
    pub completion: Completion<Snapshot>,
    /// Keys that were not started, with the reason
    pub rejected: Vec<(String, AnimationError)>,
}

impl Batch {
    pub fn is_rejected(&self, key: &str) -> bool {
        self.rejected.iter().any(|(k, _)| k == key)
    }
}

/// A batch still waiting on the spring animations it started
struct PendingBatch {
    animations: Vec<Completion<AnimValue>>,
    sender: CompletionSender<Snapshot>,
}

impl PendingBatch {
    /// `Some(cancelled)` once every animation has resolved
    fn outcome(&mut self) -> Option<bool> {
        let mut cancelled = false;
        for animation in &mut self.animations {
            cancelled |= animation.try_result()?.cancelled;
        }
        Some(cancelled)
    }
}

/// What happened to this controller's springs during the current frame
#[derive(Default)]
struct FrameFlags {
    scheduled: bool,
    started: bool,
    changed: bool,
    rested: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ControllerEvent {
    Start,
    Change,
    Rest,
}

struct ControllerShared {
    handle: FrameLoopHandle,
    springs: RefCell<IndexMap<String, SpringValue>>,
    config: RefCell<ConfigSource>,
    listeners: RefCell<Listeners<Snapshot, ControllerEvent>>,
    frame: RefCell<FrameFlags>,
    batches: RefCell<Vec<PendingBatch>>,
}

impl ControllerShared {
    fn add_spring(self: &Rc<Self>, key: &str, value: AnimValue) -> SpringValue {
        let spring = SpringValue::with_default(self.handle.clone(), value).with_key(key);
        let weak = Rc::downgrade(self);

        spring.on_start({
            let weak = weak.clone();
            move |_| Self::mark(&weak, |flags| flags.started = true)
        });
        spring.on_change({
            let weak = weak.clone();
            move |_| Self::mark(&weak, |flags| flags.changed = true)
        });
        spring.on_rest({
            let weak = weak.clone();
            move |_| Self::mark(&weak, |flags| flags.rested = true)
        });
        spring.on_cancel(move |_| Self::mark(&weak, |_| {}));

        self.springs
            .borrow_mut()
            .insert(key.to_string(), spring.clone());
        spring
    }

    /// Record a spring notification and schedule the frame-end flush
    fn mark(weak: &Weak<Self>, update: impl FnOnce(&mut FrameFlags)) {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let schedule = {
            let mut flags = shared.frame.borrow_mut();
            update(&mut flags);
            !std::mem::replace(&mut flags.scheduled, true)
        };
        if schedule {
            let weak = weak.clone();
            shared.handle.defer(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.flush_frame();
                }
            });
        }
    }

    fn springs(&self) -> Vec<SpringValue> {
        self.springs.borrow().values().cloned().collect()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::from_map(
            self.springs
                .borrow()
                .iter()
                .map(|(key, spring)| (key.clone(), spring.get()))
                .collect(),
        )
    }

    fn is_animating(&self) -> bool {
        self.springs.borrow().values().any(SpringValue::is_animating)
    }

    fn flush_frame(&self) {
        let flags = std::mem::take(&mut *self.frame.borrow_mut());
        let snapshot = self.snapshot();

        if flags.started {
            let listeners = self.listeners.borrow().snapshot(ControllerEvent::Start);
            emit(listeners, &snapshot);
        }
        if flags.changed {
            let listeners = self.listeners.borrow().snapshot(ControllerEvent::Change);
            emit(listeners, &snapshot);
        }

        let finished = {
            let mut batches = self.batches.borrow_mut();
            let mut done = Vec::new();
            for mut batch in std::mem::take(&mut *batches) {
                match batch.outcome() {
                    Some(cancelled) => done.push((batch.sender, cancelled)),
                    None => batches.push(batch),
                }
            }
            done
        };
        for (sender, cancelled) in finished {
            let result = if cancelled {
                AnimationResult::cancelled(snapshot.clone())
            } else {
                AnimationResult::finished(snapshot.clone())
            };
            let _ = sender.send(result);
        }

        if flags.rested && !self.is_animating() {
            let listeners = self.listeners.borrow().snapshot(ControllerEvent::Rest);
            emit(listeners, &snapshot);
        }
    }
}

/// A group of springs keyed by property name
///
/// Clones share the same springs.
#[derive(Clone)]
pub struct Controller {
    shared: Rc<ControllerShared>,
}

impl Controller {
    /// Create a controller with one idle spring per initial key
    pub fn new(handle: FrameLoopHandle, initial: impl Into<Goals>) -> Self {
        let controller = Self {
            shared: Rc::new(ControllerShared {
                handle,
                springs: RefCell::new(IndexMap::new()),
                config: RefCell::new(ConfigSource::default()),
                listeners: RefCell::new(Listeners::new()),
                frame: RefCell::new(FrameFlags::default()),
                batches: RefCell::new(Vec::new()),
            }),
        };
        for (key, value) in initial.into() {
            controller.shared.add_spring(&key, value);
        }
        controller
    }

    /// Set the default config source (builder pattern)
    pub fn with_config(self, config: impl Into<ConfigSource>) -> Self {
        self.set_config(config);
        self
    }

    /// Replace the default config source; applies from the next update
    pub fn set_config(&self, config: impl Into<ConfigSource>) {
        *self.shared.config.borrow_mut() = config.into();
    }

    pub fn config(&self) -> ConfigSource {
        self.shared.config.borrow().clone()
    }

    /// Animate every key in `goals` toward its goal
    pub fn update(&self, goals: impl Into<Goals>) -> Batch {
        self.apply(goals.into(), None)
    }

    /// Like [`Controller::update`], layering `overrides` over the default
    /// config for this update only
    pub fn update_with(&self, goals: impl Into<Goals>, overrides: impl Into<ConfigSource>) -> Batch {
        self.apply(goals.into(), Some(overrides.into()))
    }

    fn apply(&self, goals: Goals, overrides: Option<ConfigSource>) -> Batch {
        let source = self.config();
        let mut rejected = Vec::new();
        let mut animations = Vec::new();

        for (key, goal) in goals {
            let mut partial = source.partial_for(&key);
            if let Some(overrides) = &overrides {
                partial = partial.merge(&overrides.partial_for(&key));
            }
            let config = match partial.resolve() {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("Rejecting key '{}': {}", key, err);
                    rejected.push((key, err.into()));
                    continue;
                }
            };

            let existing = self.shared.springs.borrow().get(&key).cloned();
            let Some(spring) = existing else {
                // First sighting of a key: it appears at its goal
                let spring = self.shared.add_spring(&key, goal);
                spring.set_config(config);
                continue;
            };

            if spring.shape() != goal.shape() {
                let err = AnimationError::ShapeMismatch {
                    expected: spring.shape(),
                    found: goal.shape(),
                };
                tracing::warn!("Rejecting key '{}': {}", key, err);
                rejected.push((key, err));
                continue;
            }

            spring.set_config(config);
            match spring.start(goal) {
                Ok(mut animation) => {
                    if !animation.is_resolved() {
                        animations.push(animation);
                    }
                }
                Err(err) => {
                    tracing::warn!("Rejecting key '{}': {}", key, err);
                    rejected.push((key, err));
                }
            }
        }

        tracing::debug!(
            "Controller update: {} animating, {} rejected",
            animations.len(),
            rejected.len()
        );

        let snapshot = self.snapshot();
        let completion = if animations.is_empty() {
            Completion::ready(AnimationResult::finished(snapshot))
        } else {
            let (sender, completion) = Completion::channel(snapshot);
            self.shared
                .batches
                .borrow_mut()
                .push(PendingBatch { animations, sender });
            completion
        };

        Batch {
            completion,
            rejected,
        }
    }

    /// Jump keys to values without animating
    ///
    /// Returns the keys that could not be set.
    pub fn set(&self, values: impl Into<Goals>) -> Vec<(String, AnimationError)> {
        let mut rejected = Vec::new();
        for (key, value) in values.into() {
            let existing = self.shared.springs.borrow().get(&key).cloned();
            match existing {
                Some(spring) => {
                    if let Err(err) = spring.set(value) {
                        rejected.push((key, err));
                    }
                }
                None => {
                    self.shared.add_spring(&key, value);
                }
            }
        }
        rejected
    }

    /// Stop every key
    pub fn stop(&self) {
        for spring in self.shared.springs() {
            spring.stop();
        }
    }

    /// Stop only the listed keys
    pub fn stop_keys<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            if let Some(spring) = self.spring(key.as_ref()) {
                spring.stop();
            }
        }
    }

    pub fn pause(&self) {
        for spring in self.shared.springs() {
            spring.pause();
        }
    }

    pub fn resume(&self) {
        for spring in self.shared.springs() {
            spring.resume();
        }
    }

    /// Snap every animating key to its goal
    pub fn finish(&self) {
        for spring in self.shared.springs() {
            spring.finish();
        }
    }

    pub fn get(&self, key: &str) -> Option<AnimValue> {
        self.shared.springs.borrow().get(key).map(SpringValue::get)
    }

    /// Current value of every key, in insertion order
    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot()
    }

    pub fn spring(&self, key: &str) -> Option<SpringValue> {
        self.shared.springs.borrow().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.shared.springs.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared.springs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.springs.borrow().is_empty()
    }

    /// Whether any key is running or paused mid-flight
    pub fn is_animating(&self) -> bool {
        self.shared.is_animating()
    }

    /// Called once per frame in which an update set keys in motion
    pub fn on_start(&self, f: impl Fn(&Snapshot) + 'static) -> ListenerId {
        self.shared.listeners.borrow_mut().add(ControllerEvent::Start, f)
    }

    /// Called at most once per frame in which any key moved
    pub fn on_change(&self, f: impl Fn(&Snapshot) + 'static) -> ListenerId {
        self.shared.listeners.borrow_mut().add(ControllerEvent::Change, f)
    }

    /// Called when the last animating key comes to rest
    pub fn on_rest(&self, f: impl Fn(&Snapshot) + 'static) -> ListenerId {
        self.shared.listeners.borrow_mut().add(ControllerEvent::Rest, f)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.listeners.borrow_mut().remove(id)
    }

    /// Whether two handles refer to the same controller
    pub fn ptr_eq(&self, other: &Controller) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("keys", &self.keys())
            .field("animating", &self.is_animating())
            .finish()
    }
}
