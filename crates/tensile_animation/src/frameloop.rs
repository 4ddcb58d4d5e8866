//! Frameloop
//!
//! Advances every active spring once per frame. Springs register themselves
//! when they start moving and drop out of the active set as soon as they
//! rest, pause, stop or are dropped.
//!
//! A tick runs in two passes: every active spring integrates first, then
//! queued notifications are delivered in registration order. Listeners
//! therefore always observe a fully advanced frame, and may freely call back
//! into the engine since no internal borrow is held while they run.
//!
//! The frameloop is lazy. It reports [`DriverSignal::Start`] to its
//! [`FrameDriver`] on the first registration, and [`DriverSignal::Stop`] once
//! a tick leaves nothing active. Hosts use this to begin or cease calling
//! [`FrameLoop::tick`] from their display link or event loop.
//!
//! # Global frameloop
//!
//! Each thread owns one lazily created frameloop, reachable through
//! [`frameloop()`]. Tests and embedders inject their own with
//! [`set_frameloop`], or keep an independent [`FrameLoop`] and pass its
//! handle around explicitly.
//!
//! ```ignore
//! use tensile_animation::{FrameLoop, ManualClock, SpringValue};
//!
//! let clock = ManualClock::new();
//! let frameloop = FrameLoop::with_clock(clock.clone());
//! let opacity = SpringValue::with_default(frameloop.handle(), 0.0);
//! opacity.start(1.0)?;
//!
//! while frameloop.is_running() {
//!     clock.advance(std::time::Duration::from_millis(16));
//!     frameloop.tick();
//! }
//! ```

use crate::error::AnimationError;
use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use slotmap::{new_key_type, SlotMap};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

// ============================================================================
// Global Frameloop State
// ============================================================================

thread_local! {
    static GLOBAL_FRAMELOOP: RefCell<Option<FrameLoop>> = const { RefCell::new(None) };
}

/// Get a handle to this thread's frameloop, creating it on first use
///
/// The lazily created frameloop reads time from a [`SystemClock`].
pub fn frameloop() -> FrameLoopHandle {
    GLOBAL_FRAMELOOP.with(|global| {
        global
            .borrow_mut()
            .get_or_insert_with(FrameLoop::new)
            .handle()
    })
}

/// Replace this thread's frameloop, returning the previous one
///
/// Springs created against the previous frameloop keep using it for as
/// long as the returned value is kept alive.
pub fn set_frameloop(frameloop: FrameLoop) -> Option<FrameLoop> {
    GLOBAL_FRAMELOOP.with(|global| global.borrow_mut().replace(frameloop))
}

/// Get this thread's frameloop handle without creating one
pub fn try_frameloop() -> Option<FrameLoopHandle> {
    GLOBAL_FRAMELOOP.with(|global| global.borrow().as_ref().map(FrameLoop::handle))
}

/// Run `f` against this thread's frameloop, creating it on first use
///
/// This is how a host drives the global frameloop:
///
/// ```ignore
/// tensile_animation::with_frameloop(|frameloop| frameloop.tick());
/// ```
pub fn with_frameloop<R>(f: impl FnOnce(&FrameLoop) -> R) -> R {
    let frameloop = GLOBAL_FRAMELOOP.with(|global| {
        global
            .borrow_mut()
            .get_or_insert_with(FrameLoop::new)
            .clone()
    });
    f(&frameloop)
}

new_key_type! {
    /// Handle to a spring registered with a frameloop
    pub struct SpringId;
}

// ============================================================================
// Clocks
// ============================================================================

/// Source of frame timestamps
pub trait Clock {
    /// Monotonic time since an arbitrary origin
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`]
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so a test keeps one clone and hands the
/// other to the frameloop.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, dt: Duration) {
        self.now.set(self.now.get() + dt);
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

// ============================================================================
// Drivers
// ============================================================================

/// Lifecycle signal sent to the host driving a frameloop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverSignal {
    /// Something started animating; begin calling `tick()`
    Start,
    /// Nothing is animating any more; ticks can stop
    Stop,
}

/// Host hook notified when the frameloop starts and stops
pub trait FrameDriver {
    fn signal(&self, signal: DriverSignal);
}

impl<F: Fn(DriverSignal)> FrameDriver for F {
    fn signal(&self, signal: DriverSignal) {
        self(signal)
    }
}

// ============================================================================
// Frameloop
// ============================================================================

/// Tuning for a frameloop
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameLoopConfig {
    /// Ticks a spring may run before a degenerate-motion warning is logged
    pub stall_tick_limit: u32,
    /// Upper bound on the delta of a single tick
    ///
    /// Keeps a long stall (a backgrounded window, a debugger pause) from
    /// turning into one huge jump.
    pub max_frame_delta: Duration,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            stall_tick_limit: 10_000,
            max_frame_delta: Duration::from_millis(100),
        }
    }
}

/// Per-tick information handed to every advancing spring
#[derive(Clone, Copy, Debug)]
pub struct FrameInfo {
    /// Frame counter, starting at 1 for the first tick
    pub frame: u64,
    /// Seconds covered by this tick
    pub dt: f32,
    pub stall_tick_limit: u32,
}

/// Something the frameloop advances each tick
pub(crate) trait FrameTarget {
    /// Integrate one frame; return `true` to stay in the active set
    fn advance(&self, frame: &FrameInfo) -> bool;

    /// Deliver notifications queued by `advance` or by API calls
    fn flush(&self);
}

type FrameEndCallback = Box<dyn FnOnce()>;

struct FrameLoopInner {
    targets: SlotMap<SpringId, Weak<dyn FrameTarget>>,
    active: IndexSet<SpringId, FxBuildHasher>,
    frame_end: Vec<FrameEndCallback>,
    clock: Box<dyn Clock>,
    last_frame: Option<Duration>,
    running: bool,
    in_tick: bool,
    frame: u64,
    driver: Option<Rc<dyn FrameDriver>>,
    config: FrameLoopConfig,
}

/// Owner of a set of springs advanced together
///
/// Clones share the same frameloop. Springs only hold a weak
/// [`FrameLoopHandle`], so dropping every `FrameLoop` clone detaches them.
#[derive(Clone)]
pub struct FrameLoop {
    inner: Rc<RefCell<FrameLoopInner>>,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(FrameLoopInner {
                targets: SlotMap::with_key(),
                active: IndexSet::default(),
                frame_end: Vec::new(),
                clock: Box::new(clock),
                last_frame: None,
                running: false,
                in_tick: false,
                frame: 0,
                driver: None,
                config: FrameLoopConfig::default(),
            })),
        }
    }

    /// Replace the tuning (builder pattern)
    pub fn with_config(self, config: FrameLoopConfig) -> Self {
        self.inner.borrow_mut().config = config;
        self
    }

    /// Get a handle to this frameloop for passing to springs
    pub fn handle(&self) -> FrameLoopHandle {
        FrameLoopHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> FrameLoopConfig {
        self.inner.borrow().config
    }

    /// Set the host hook told when ticking should start and stop
    pub fn set_driver(&self, driver: impl FrameDriver + 'static) {
        self.inner.borrow_mut().driver = Some(Rc::new(driver));
    }

    /// Set a callback run whenever the frameloop needs ticking again
    ///
    /// Shorthand for a driver that only cares about [`DriverSignal::Start`].
    pub fn set_wake_callback<F>(&self, callback: F)
    where
        F: Fn() + 'static,
    {
        self.set_driver(move |signal: DriverSignal| {
            if signal == DriverSignal::Start {
                callback();
            }
        });
    }

    /// Tick using the clock to measure the elapsed time
    ///
    /// Returns `true` while springs are still active.
    pub fn tick(&self) -> bool {
        self.run_frame(None)
    }

    /// Tick with an explicit delta, ignoring the clock
    ///
    /// Deterministic single-stepping for tests and offline simulation.
    pub fn advance(&self, dt: Duration) -> bool {
        self.run_frame(Some(dt))
    }

    /// Whether the frameloop wants ticks
    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    /// Number of springs advanced on the next tick
    pub fn active_count(&self) -> usize {
        self.inner.borrow().active.len()
    }

    /// Number of live springs attached to this frameloop
    pub fn spring_count(&self) -> usize {
        self.inner.borrow().targets.len()
    }

    /// Number of ticks run so far
    pub fn frame_count(&self) -> u64 {
        self.inner.borrow().frame
    }

    /// Queue a callback for the end of the current (or next) tick
    pub fn defer(&self, callback: impl FnOnce() + 'static) {
        self.handle().defer(callback);
    }

    fn run_frame(&self, explicit_dt: Option<Duration>) -> bool {
        let (targets, info) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.in_tick {
                tracing::warn!("Frameloop tick requested from inside a tick, ignoring");
                return !inner.active.is_empty();
            }
            inner.in_tick = true;

            let dt = match explicit_dt {
                Some(dt) => dt,
                None => {
                    let now = inner.clock.now();
                    let dt = inner
                        .last_frame
                        .map(|last| now.saturating_sub(last))
                        .unwrap_or_default();
                    inner.last_frame = Some(now);
                    dt
                }
            };
            inner.frame += 1;

            let info = FrameInfo {
                frame: inner.frame,
                dt: dt.min(inner.config.max_frame_delta).as_secs_f32(),
                stall_tick_limit: inner.config.stall_tick_limit,
            };
            let targets: Vec<(SpringId, Option<Rc<dyn FrameTarget>>)> = inner
                .active
                .iter()
                .map(|&id| (id, inner.targets.get(id).and_then(Weak::upgrade)))
                .collect();
            (targets, info)
        };

        tracing::trace!(
            "Frameloop tick {}: dt={:.4}s, {} active",
            info.frame,
            info.dt,
            targets.len()
        );

        // Integrate everything before anyone is notified
        let mut finished = Vec::new();
        for (id, target) in &targets {
            match target {
                Some(target) => {
                    if !target.advance(&info) {
                        finished.push((*id, true));
                    }
                }
                None => finished.push((*id, false)),
            }
        }

        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            for (id, alive) in finished {
                inner.active.shift_remove(&id);
                if !alive {
                    inner.targets.remove(id);
                }
            }
        }

        for target in targets.iter().filter_map(|(_, target)| target.as_ref()) {
            target.flush();
        }
        drop(targets);

        // Frame-end callbacks may queue further callbacks
        loop {
            let callbacks = std::mem::take(&mut self.inner.borrow_mut().frame_end);
            if callbacks.is_empty() {
                break;
            }
            for callback in callbacks {
                callback();
            }
        }

        let (still_active, stop_driver) = {
            let mut inner = self.inner.borrow_mut();
            inner.in_tick = false;
            let still_active = !inner.active.is_empty();
            let stop_driver = if !still_active && inner.running {
                inner.running = false;
                inner.last_frame = None;
                tracing::debug!("Frameloop idle after {} frames", inner.frame);
                Some(inner.driver.clone())
            } else {
                None
            };
            (still_active, stop_driver)
        };

        if let Some(Some(driver)) = stop_driver {
            driver.signal(DriverSignal::Stop);
        }
        still_active
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("FrameLoop")
                .field("running", &inner.running)
                .field("frame", &inner.frame)
                .field("active", &inner.active.len())
                .field("springs", &inner.targets.len())
                .finish(),
            Err(_) => f.debug_struct("FrameLoop").finish_non_exhaustive(),
        }
    }
}

/// Weak handle to a frameloop
///
/// Operations on a handle whose frameloop was dropped do nothing, except
/// [`FrameLoopHandle::register`] which reports [`AnimationError::Detached`].
#[derive(Clone, Default)]
pub struct FrameLoopHandle {
    inner: Weak<RefCell<FrameLoopInner>>,
}

impl FrameLoopHandle {
    /// Whether the frameloop is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Upgrade back to an owning frameloop
    pub fn upgrade(&self) -> Option<FrameLoop> {
        self.inner.upgrade().map(|inner| FrameLoop { inner })
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.borrow().running)
            .unwrap_or(false)
    }

    /// Current frame number, or 0 for a dropped frameloop
    pub fn frame_count(&self) -> u64 {
        self.inner
            .upgrade()
            .map(|inner| inner.borrow().frame)
            .unwrap_or(0)
    }

    /// Queue a callback for the end of the current (or next) tick
    ///
    /// Returns `false` if the frameloop is gone.
    pub fn defer(&self, callback: impl FnOnce() + 'static) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.borrow_mut().frame_end.push(Box::new(callback));
                true
            }
            None => false,
        }
    }

    pub(crate) fn insert(&self, target: Weak<dyn FrameTarget>) -> Option<SpringId> {
        self.inner
            .upgrade()
            .map(|inner| inner.borrow_mut().targets.insert(target))
    }

    /// Put a spring in the active set, starting the frameloop if idle
    pub(crate) fn register(&self, id: SpringId) -> Result<(), AnimationError> {
        let inner = self.inner.upgrade().ok_or(AnimationError::Detached)?;
        let start_driver = {
            let mut guard = inner.borrow_mut();
            let inner = &mut *guard;
            if !inner.targets.contains_key(id) {
                return Err(AnimationError::Detached);
            }
            inner.active.insert(id);
            if inner.running {
                None
            } else {
                inner.running = true;
                inner.last_frame = Some(inner.clock.now());
                tracing::debug!("Frameloop started at frame {}", inner.frame);
                Some(inner.driver.clone())
            }
        };
        if let Some(Some(driver)) = start_driver {
            driver.signal(DriverSignal::Start);
        }
        Ok(())
    }

    /// Detach a dropped spring
    pub(crate) fn remove(&self, id: SpringId) {
        if let Some(inner) = self.inner.upgrade() {
            // Inside a tick the dead weak entry is swept on the next pass
            if let Ok(mut inner) = inner.try_borrow_mut() {
                inner.active.shift_remove(&id);
                inner.targets.remove(id);
            }
        }
    }
}

impl fmt::Debug for FrameLoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoopHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        remaining: Cell<u32>,
        log: Rc<RefCell<Vec<String>>>,
        name: &'static str,
    }

    impl FrameTarget for Countdown {
        fn advance(&self, _frame: &FrameInfo) -> bool {
            self.log.borrow_mut().push(format!("advance {}", self.name));
            self.remaining.set(self.remaining.get().saturating_sub(1));
            self.remaining.get() > 0
        }

        fn flush(&self) {
            self.log.borrow_mut().push(format!("flush {}", self.name));
        }
    }

    fn countdown(
        frameloop: &FrameLoop,
        name: &'static str,
        ticks: u32,
        log: &Rc<RefCell<Vec<String>>>,
    ) -> (Rc<Countdown>, SpringId) {
        let target = Rc::new(Countdown {
            remaining: Cell::new(ticks),
            log: log.clone(),
            name,
        });
        let weak: Weak<dyn FrameTarget> = Rc::downgrade(&target) as Weak<Countdown>;
        let id = frameloop.handle().insert(weak).unwrap();
        (target, id)
    }

    #[test]
    fn test_advances_all_before_flushing_any() {
        let frameloop = FrameLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (_a, a) = countdown(&frameloop, "a", 2, &log);
        let (_b, b) = countdown(&frameloop, "b", 2, &log);
        frameloop.handle().register(a).unwrap();
        frameloop.handle().register(b).unwrap();

        assert!(frameloop.advance(Duration::from_millis(16)));
        assert_eq!(
            *log.borrow(),
            ["advance a", "advance b", "flush a", "flush b"]
        );
    }

    #[test]
    fn test_lazy_start_and_stop_signal_driver() {
        let frameloop = FrameLoop::new();
        let signals = Rc::new(RefCell::new(Vec::new()));
        let sink = signals.clone();
        frameloop.set_driver(move |signal: DriverSignal| sink.borrow_mut().push(signal));

        let log = Rc::new(RefCell::new(Vec::new()));
        let (_target, id) = countdown(&frameloop, "a", 2, &log);
        assert!(!frameloop.is_running());

        frameloop.handle().register(id).unwrap();
        assert!(frameloop.is_running());
        assert_eq!(*signals.borrow(), [DriverSignal::Start]);

        assert!(frameloop.advance(Duration::from_millis(16)));
        assert!(!frameloop.advance(Duration::from_millis(16)));
        assert!(!frameloop.is_running());
        assert_eq!(
            *signals.borrow(),
            [DriverSignal::Start, DriverSignal::Stop]
        );

        // Restarts on the next registration
        frameloop.handle().register(id).unwrap();
        assert_eq!(signals.borrow().len(), 3);
    }

    #[test]
    fn test_dropped_targets_are_swept() {
        let frameloop = FrameLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (target, id) = countdown(&frameloop, "a", 100, &log);
        frameloop.handle().register(id).unwrap();
        drop(target);

        assert!(!frameloop.advance(Duration::from_millis(16)));
        assert_eq!(frameloop.spring_count(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_clock_measures_from_start() {
        let clock = ManualClock::new();
        let frameloop = FrameLoop::with_clock(clock.clone());
        let seen = Rc::new(Cell::new(0.0f32));

        struct Probe(Rc<Cell<f32>>);
        impl FrameTarget for Probe {
            fn advance(&self, frame: &FrameInfo) -> bool {
                self.0.set(frame.dt);
                true
            }
            fn flush(&self) {}
        }

        let probe = Rc::new(Probe(seen.clone()));
        let weak: Weak<dyn FrameTarget> = Rc::downgrade(&probe) as Weak<Probe>;
        let id = frameloop.handle().insert(weak).unwrap();

        clock.advance(Duration::from_secs(5));
        frameloop.handle().register(id).unwrap();
        clock.advance(Duration::from_millis(20));
        frameloop.tick();
        assert!((seen.get() - 0.02).abs() < 1e-6);

        // Long gaps are capped
        clock.advance(Duration::from_secs(3));
        frameloop.tick();
        assert!((seen.get() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_deferred_callbacks_run_at_frame_end() {
        let frameloop = FrameLoop::new();
        let ran = Rc::new(Cell::new(0));
        let counter = ran.clone();
        let handle = frameloop.handle();
        frameloop.defer(move || {
            counter.set(counter.get() + 1);
            let counter = counter.clone();
            handle.defer(move || counter.set(counter.get() + 10));
        });
        assert_eq!(ran.get(), 0);

        frameloop.advance(Duration::ZERO);
        assert_eq!(ran.get(), 11);
    }

    #[test]
    fn test_dead_handle_is_detached() {
        let handle = FrameLoop::new().handle();
        assert!(!handle.is_alive());
        assert!(!handle.defer(|| {}));
        assert_eq!(
            handle.register(SpringId::default()),
            Err(AnimationError::Detached)
        );
    }

    #[test]
    fn test_global_frameloop_can_be_injected() {
        let injected = FrameLoop::new();
        let previous = set_frameloop(injected.clone());
        assert!(frameloop().upgrade().is_some());
        with_frameloop(|current| assert_eq!(current.frame_count(), 0));
        injected.advance(Duration::ZERO);
        assert_eq!(frameloop().frame_count(), 1);
        if let Some(previous) = previous {
            set_frameloop(previous);
        }
    }
}
