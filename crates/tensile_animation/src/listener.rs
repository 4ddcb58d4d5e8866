//! Listener lists shared by springs, controllers and interpolations

use slotmap::{new_key_type, SlotMap};
use std::rc::Rc;

new_key_type! {
    /// Handle returned when subscribing; pass it to `off` to unsubscribe
    pub struct ListenerId;
}

pub(crate) type Listener<E> = Rc<dyn Fn(&E)>;

/// Listeners of one owner, tagged with the channel they subscribed to
///
/// All channels share one key space, so an id removes exactly the listener
/// it was issued for whichever channel that was.
pub(crate) struct Listeners<E, C = ()> {
    entries: SlotMap<ListenerId, (C, Listener<E>)>,
    /// Subscription order
    order: Vec<ListenerId>,
}

impl<E, C: Copy + PartialEq> Listeners<E, C> {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub fn add(&mut self, channel: C, listener: impl Fn(&E) + 'static) -> ListenerId {
        let id = self.entries.insert((channel, Rc::new(listener)));
        self.order.push(id);
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        if self.entries.remove(id).is_none() {
            return false;
        }
        self.order.retain(|entry| *entry != id);
        true
    }

    /// Clone the listeners of `channel` so they can be invoked without
    /// holding a borrow
    pub fn snapshot(&self, channel: C) -> Vec<Listener<E>> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(*id))
            .filter(|(c, _)| *c == channel)
            .map(|(_, listener)| listener.clone())
            .collect()
    }
}

impl<E, C: Copy + PartialEq> Default for Listeners<E, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Invoke every listener in `list` with `event`
pub(crate) fn emit<E>(list: Vec<Listener<E>>, event: &E) {
    for listener in list {
        listener(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Clone, Copy, PartialEq)]
    enum Channel {
        A,
        B,
    }

    #[test]
    fn test_ids_are_unique_across_channels() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::<u32, Channel>::new();
        let a = {
            let seen = seen.clone();
            listeners.add(Channel::A, move |v| seen.borrow_mut().push(("a", *v)))
        };
        let b = {
            let seen = seen.clone();
            listeners.add(Channel::B, move |v| seen.borrow_mut().push(("b", *v)))
        };
        assert_ne!(a, b);

        assert!(listeners.remove(b));
        assert!(!listeners.remove(b));
        emit(listeners.snapshot(Channel::A), &1);
        emit(listeners.snapshot(Channel::B), &2);
        assert_eq!(*seen.borrow(), [("a", 1)]);
    }

    #[test]
    fn test_stale_id_does_not_remove_reused_slot() {
        let mut listeners = Listeners::<u32>::new();
        let first = listeners.add((), |_| {});
        listeners.remove(first);
        let second = listeners.add((), |_| {});
        assert!(!listeners.remove(first));
        assert_eq!(listeners.snapshot(()).len(), 1);
        assert!(listeners.remove(second));
    }

    #[test]
    fn test_snapshot_keeps_subscription_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::<u32>::new();
        for tag in 0..3 {
            let seen = seen.clone();
            listeners.add((), move |_| seen.borrow_mut().push(tag));
        }
        emit(listeners.snapshot(()), &0);
        assert_eq!(*seen.borrow(), [0, 1, 2]);
    }
}
