//! Observers
//!
//! An observer is anything notified when a cell's value may have changed:
//! watchers, or plain callbacks registered with
//! [`Cell::add_observer`](super::Cell::add_observer).
//!
//! During a flush an observer first receives `will_update` for every cell
//! it observes that is about to be brought up to date, then one `update`
//! per such cell once that cell is resolved. An observer that counts the
//! two calls can therefore act exactly once, after all of its inputs are
//! consistent.

use std::cell::Cell as StdCell;

use crate::key::Key;

/// Receiver of change notifications from cells.
pub trait Observer {
    /// The cell identified by `key` is about to be updated.
    fn will_update(&self, key: &Key);

    /// The cell identified by `key` has been updated. `did_change` is
    /// `false` when the cell's value turned out to be unchanged.
    fn update(&self, key: &Key, did_change: bool);
}

/// An observer that invokes a callback whenever an observed cell changed.
pub struct Subscriber {
    /// The callback to invoke when an observed cell changes.
    notify: Box<dyn Fn(&Key)>,
    notifications: StdCell<usize>,
    pending: StdCell<usize>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(&Key) + 'static,
    {
        Self {
            notify: Box::new(notify),
            notifications: StdCell::new(0),
            pending: StdCell::new(0),
        }
    }

    /// Number of change notifications received so far.
    pub fn notifications(&self) -> usize {
        self.notifications.get()
    }

    /// Number of `will_update` calls still waiting for their `update`.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }
}

impl Observer for Subscriber {
    fn will_update(&self, _key: &Key) {
        self.pending.set(self.pending.get() + 1);
    }

    fn update(&self, key: &Key, did_change: bool) {
        self.pending.set(self.pending.get().saturating_sub(1));
        if did_change {
            self.notifications.set(self.notifications.get() + 1);
            (self.notify)(key);
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("notifications", &self.notifications())
            .field("pending", &self.pending())
            .finish()
    }
}
