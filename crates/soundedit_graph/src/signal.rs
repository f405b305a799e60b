// SPDX-License-Identifier: MIT OR Apache-2.0
//! Level-triggered dirty flag with change subscribers.

use std::fmt;

/// Handle returned by [`DirtySignal::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(bool)>;

/// Boolean "has unsaved changes" state.
///
/// Subscribers are called synchronously on each transition: `true` when the
/// first mutation after a clear happens, `false` when cleared. Repeated
/// mutations while already dirty do not notify.
#[derive(Default)]
pub struct DirtySignal {
    dirty: bool,
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
}

impl DirtySignal {
    /// Whether there are changes since the last clear
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Register a callback for dirty-state transitions
    pub fn subscribe(&mut self, callback: impl FnMut(bool) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Raise the flag
    pub fn mark(&mut self) {
        if !self.dirty {
            self.dirty = true;
            self.notify();
        }
    }

    /// Lower the flag (e.g. after a successful save)
    pub fn clear(&mut self) {
        if self.dirty {
            self.dirty = false;
            self.notify();
        }
    }

    fn notify(&mut self) {
        let dirty = self.dirty;
        for (_, callback) in &mut self.subscribers {
            callback(dirty);
        }
    }
}

impl Clone for DirtySignal {
    /// Copies the flag; subscriptions stay with the original
    fn clone(&self) -> Self {
        Self {
            dirty: self.dirty,
            next_id: 0,
            subscribers: Vec::new(),
        }
    }
}

impl fmt::Debug for DirtySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirtySignal")
            .field("dirty", &self.dirty)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_notifies_on_transitions_only() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut signal = DirtySignal::default();
        let sink = Rc::clone(&seen);
        signal.subscribe(move |dirty| sink.borrow_mut().push(dirty));

        signal.mark();
        signal.mark();
        signal.clear();
        signal.clear();
        signal.mark();

        assert_eq!(*seen.borrow(), vec![true, false, true]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut signal = DirtySignal::default();
        let sink = Rc::clone(&count);
        let id = signal.subscribe(move |_| *sink.borrow_mut() += 1);

        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.mark();
        assert_eq!(*count.borrow(), 0);
        assert!(signal.is_dirty());
    }
}
