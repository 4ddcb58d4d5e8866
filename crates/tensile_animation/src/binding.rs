//! Declarative binding
//!
//! A [`SpringBinding`] turns a host's render pass into spring updates: each
//! call to [`SpringBinding::render`] recomputes the goals from the current
//! props, forwards only the keys whose goal changed since the previous
//! render, and returns the current animated values.
//!
//! ```ignore
//! let mut binding = SpringBinding::new(frameloop(), |open: &bool| {
//!     Goals::new().with("height", if *open { 240.0 } else { 0.0 })
//! });
//!
//! // In the host's render function
//! let values = binding.render(&is_open);
//! ```

use crate::config::ConfigSource;
use crate::controller::{Batch, Controller};
use crate::frameloop::FrameLoopHandle;
use crate::value::{Goals, Snapshot};
use std::fmt;

type GoalsFn<P> = Box<dyn Fn(&P) -> Goals>;

/// Render-driven spring controller
pub struct SpringBinding<P> {
    controller: Controller,
    goals: GoalsFn<P>,
    last: Option<Goals>,
    last_batch: Option<Batch>,
}

impl<P> SpringBinding<P> {
    /// Bind `goals` to a new controller
    ///
    /// Without [`SpringBinding::with_from`], keys appear at their first
    /// goal and only animate on later changes.
    pub fn new<F>(handle: FrameLoopHandle, goals: F) -> Self
    where
        F: Fn(&P) -> Goals + 'static,
    {
        Self {
            controller: Controller::new(handle, Goals::new()),
            goals: Box::new(goals),
            last: None,
            last_batch: None,
        }
    }

    /// Starting values, animated toward the goals of the first render
    pub fn with_from(self, from: impl Into<Goals>) -> Self {
        for (key, err) in self.controller.set(from) {
            tracing::warn!("Ignoring starting value for '{}': {}", key, err);
        }
        self
    }

    pub fn with_config(self, config: impl Into<ConfigSource>) -> Self {
        self.controller.set_config(config);
        self
    }

    /// Recompute goals from `props` and return the current values
    pub fn render(&mut self, props: &P) -> Snapshot {
        let goals = (self.goals)(props);
        let changed: Goals = goals
            .iter()
            .filter(|(key, goal)| {
                self.last
                    .as_ref()
                    .and_then(|last| last.get(key))
                    .map_or(true, |previous| previous != *goal)
            })
            .map(|(key, goal)| (key.clone(), goal.clone()))
            .collect();

        let mut remembered = goals;
        if !changed.is_empty() {
            tracing::trace!("Binding forwarding {} changed goals", changed.len());
            let batch = self.controller.update(changed);
            if !batch.rejected.is_empty() {
                for (key, err) in &batch.rejected {
                    tracing::warn!("Binding could not animate '{}': {}", key, err);
                }
                // Forget rejected goals so the next render retries them
                remembered = remembered
                    .into_iter()
                    .filter(|(key, _)| !batch.is_rejected(key))
                    .collect();
            }
            self.last_batch = Some(batch);
        }
        self.last = Some(remembered);

        self.controller.snapshot()
    }

    /// The batch started by the most recent render that changed a goal
    pub fn take_batch(&mut self) -> Option<Batch> {
        self.last_batch.take()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}

impl<P> fmt::Debug for SpringBinding<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpringBinding")
            .field("controller", &self.controller)
            .field("last", &self.last)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartialConfig;
    use crate::frameloop::FrameLoop;
    use crate::value::AnimValue;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    const FRAME: Duration = Duration::from_micros(16_667);

    struct Props {
        open: bool,
        label_width: f32,
    }

    fn panel(frameloop: &FrameLoop) -> SpringBinding<Props> {
        SpringBinding::new(frameloop.handle(), |props: &Props| {
            Goals::new()
                .with("height", if props.open { 240.0 } else { 0.0 })
                .with("width", props.label_width)
        })
    }

    #[test]
    fn test_first_render_places_keys_at_goal() {
        let frameloop = FrameLoop::new();
        let mut binding = panel(&frameloop);
        let values = binding.render(&Props {
            open: true,
            label_width: 80.0,
        });
        assert_eq!(values.number("height"), Some(240.0));
        assert!(!binding.controller().is_animating());
    }

    #[test]
    fn test_only_changed_goals_are_forwarded() {
        let frameloop = FrameLoop::new();
        let mut binding = panel(&frameloop).with_from([("height", 0.0), ("width", 0.0)]);
        binding.render(&Props {
            open: true,
            label_width: 80.0,
        });
        while frameloop.advance(FRAME) {}

        let width_starts = Rc::new(Cell::new(0));
        let sink = width_starts.clone();
        binding
            .controller()
            .spring("width")
            .unwrap()
            .on_start(move |_| sink.set(sink.get() + 1));

        let values = binding.render(&Props {
            open: false,
            label_width: 80.0,
        });
        assert_eq!(values.number("height"), Some(240.0));
        assert!(binding.controller().spring("height").unwrap().is_animating());
        assert!(!binding.controller().spring("width").unwrap().is_animating());

        frameloop.advance(FRAME);
        assert_eq!(width_starts.get(), 0);
        assert!(binding.take_batch().is_some());
    }

    #[test]
    fn test_rejected_goal_is_retried() {
        let frameloop = FrameLoop::new();
        let strict = Rc::new(Cell::new(true));
        let flag = strict.clone();
        let mut binding = SpringBinding::new(frameloop.handle(), |target: &f32| {
            Goals::new().with("x", *target)
        })
        .with_from([("x", 0.0)])
        .with_config(crate::config::ConfigSource::per_key(move |_| {
            if flag.get() {
                PartialConfig::new().mass(0.0)
            } else {
                PartialConfig::new()
            }
        }));

        binding.render(&1.0);
        assert!(!binding.controller().is_animating());

        strict.set(false);
        binding.render(&1.0);
        assert!(binding.controller().is_animating());
        while frameloop.advance(FRAME) {}
        assert_eq!(binding.controller().get("x"), Some(AnimValue::Number(1.0)));
    }
}
