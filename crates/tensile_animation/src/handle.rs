//! Imperative handle
//!
//! A [`SpringRef`] drives one or more controllers from outside any render
//! pass, typically from event handlers. Clones share the same attachment
//! list, so a component can keep one clone and hand another to its
//! handlers.

use crate::config::ConfigSource;
use crate::controller::{Batch, Controller};
use crate::error::AnimationError;
use crate::value::{AnimValue, Goals, Snapshot};
use std::cell::RefCell;
use std::rc::Rc;

/// Imperative control over a set of controllers
#[derive(Clone, Debug, Default)]
pub struct SpringRef {
    controllers: Rc<RefCell<Vec<Controller>>>,
}

impl SpringRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a controller; attaching the same one twice has no effect
    pub fn attach(&self, controller: &Controller) {
        let mut controllers = self.controllers.borrow_mut();
        if !controllers.iter().any(|c| c.ptr_eq(controller)) {
            controllers.push(controller.clone());
        }
    }

    pub fn detach(&self, controller: &Controller) -> bool {
        let mut controllers = self.controllers.borrow_mut();
        let before = controllers.len();
        controllers.retain(|c| !c.ptr_eq(controller));
        controllers.len() != before
    }

    pub fn len(&self) -> usize {
        self.controllers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.borrow().is_empty()
    }

    pub fn controllers(&self) -> Vec<Controller> {
        self.controllers.borrow().clone()
    }

    /// Update every attached controller, one batch per controller
    pub fn start(&self, goals: impl Into<Goals>) -> Vec<Batch> {
        let goals = goals.into();
        self.each(|controller| controller.update(goals.clone()))
    }

    pub fn start_with(&self, goals: impl Into<Goals>, overrides: impl Into<ConfigSource>) -> Vec<Batch> {
        let goals = goals.into();
        let overrides = overrides.into();
        self.each(|controller| controller.update_with(goals.clone(), overrides.clone()))
    }

    pub fn stop(&self) {
        self.each(Controller::stop);
    }

    pub fn pause(&self) {
        self.each(Controller::pause);
    }

    pub fn resume(&self) {
        self.each(Controller::resume);
    }

    pub fn finish(&self) {
        self.each(Controller::finish);
    }

    /// Jump every attached controller to `values`
    pub fn set(&self, values: impl Into<Goals>) -> Vec<(String, AnimationError)> {
        let values = values.into();
        self.each(|controller| controller.set(values.clone()))
            .into_iter()
            .flatten()
            .collect()
    }

    /// Value of `key` in the first attached controller that has it
    pub fn get(&self, key: &str) -> Option<AnimValue> {
        self.controllers().iter().find_map(|c| c.get(key))
    }

    /// Snapshot of every attached controller, in attachment order
    pub fn current(&self) -> Vec<Snapshot> {
        self.controllers().iter().map(Controller::snapshot).collect()
    }

    fn each<R>(&self, f: impl Fn(&Controller) -> R) -> Vec<R> {
        // Iterate a copy so callbacks may attach or detach
        let controllers = self.controllers();
        if controllers.is_empty() {
            tracing::debug!("SpringRef used with no attached controllers");
        }
        controllers.iter().map(f).collect()
    }
}
