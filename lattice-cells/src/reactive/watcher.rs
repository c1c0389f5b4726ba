//! Watchers
//!
//! A watcher is a side-effecting computation that runs whenever a cell it
//! read on its last run changes.
//!
//! # How Watchers Work
//!
//! 1. Starting a watcher runs its callback once. Every cell the callback
//!    reads gets the watcher as an observer, which also activates it.
//!
//! 2. During a flush the watcher hears `will_update` for each of its cells
//!    before any of them is resolved, and `update` after each one. It
//!    re-runs once, when the last pending `update` arrives and at least one
//!    of them reported a change. So however many of its cells change in
//!    one flush, it runs once and sees them all up to date.
//!
//! 3. After each run, cells that were not read again are released.
//!
//! # Errors
//!
//! The callback returns [`Maybe<()>`](crate::Maybe) so cell reads can use
//! `?`. A failure ends that run early and is logged; it does not stop the
//! watcher.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::Maybe;
use crate::graph::NodeId;
use crate::key::Key;

use super::context::{ArgumentTracker, TrackTarget};
use super::runtime::Runtime;
use super::state::CellState;
use super::subscriber::Observer;

struct WatcherState {
    callback: Box<dyn Fn() -> Maybe<()>>,
    this: Weak<WatcherState>,

    /// Cells read on the latest run, each observed once.
    arguments: RefCell<IndexMap<NodeId, Rc<dyn CellState>>>,

    /// `will_update` calls still waiting for their `update`.
    waiting: StdCell<usize>,
    changed: StdCell<bool>,

    running: StdCell<bool>,
    queued: StdCell<bool>,
    stopped: StdCell<bool>,
    run_count: StdCell<usize>,
}

impl WatcherState {
    fn observer(&self) -> Option<Rc<dyn Observer>> {
        let this: Rc<dyn Observer> = self.this.upgrade()?;
        Some(this)
    }

    fn run(&self) {
        if self.stopped.get() {
            return;
        }
        // A run triggered from inside the callback happens after it returns.
        if self.running.replace(true) {
            self.queued.set(true);
            return;
        }

        loop {
            self.queued.set(false);
            self.run_once();
            if !self.queued.get() || self.stopped.get() {
                break;
            }
        }
        self.running.set(false);
    }

    fn run_once(&self) {
        let Some(observer) = self.observer() else {
            return;
        };

        let known: HashSet<NodeId> = self.arguments.borrow().keys().copied().collect();
        let scope = ArgumentTracker::enter(TrackTarget::Observer(observer.clone()), None, known);
        let result = (self.callback)();
        let tracked = scope.finish();

        self.run_count.set(self.run_count.get() + 1);
        if let Err(err) = result {
            debug!(error = %err, "watcher callback failed");
        }

        let released: Vec<Rc<dyn CellState>> = if self.stopped.get() {
            // Stopped from inside the callback.
            self.arguments.borrow_mut().clear();
            tracked.into_values().collect()
        } else {
            let old = std::mem::replace(&mut *self.arguments.borrow_mut(), tracked);
            let arguments = self.arguments.borrow();
            old.into_iter()
                .filter(|(id, _)| !arguments.contains_key(id))
                .map(|(_, state)| state)
                .collect()
        };

        for state in released {
            Runtime::remove_observer(&state, &observer);
        }
    }

    fn stop(&self) {
        self.stopped.set(true);
        self.waiting.set(0);
        self.changed.set(false);

        let arguments = std::mem::take(&mut *self.arguments.borrow_mut());
        if arguments.is_empty() {
            return;
        }
        if let Some(observer) = self.observer() {
            for state in arguments.values() {
                Runtime::remove_observer(state, &observer);
            }
        }
    }
}

impl Observer for WatcherState {
    fn will_update(&self, _key: &Key) {
        self.waiting.set(self.waiting.get() + 1);
    }

    fn update(&self, _key: &Key, did_change: bool) {
        let waiting = self.waiting.get().saturating_sub(1);
        self.waiting.set(waiting);
        if did_change {
            self.changed.set(true);
        }

        if waiting == 0 && self.changed.replace(false) {
            self.run();
        }
    }
}

/// A callback that re-runs when the cells it reads change.
///
/// The watcher stops when dropped.
///
/// # Example
///
/// ```rust
/// use lattice_cells::{variable, watch, Cell};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = variable(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let _watcher = watch({
///     let (count, seen) = (count.clone(), seen.clone());
///     move || {
///         seen.borrow_mut().push(count.value()?);
///         Ok(())
///     }
/// });
///
/// count.set(5);
/// assert_eq!(*seen.borrow(), vec![0, 5]);
/// ```
pub struct Watcher {
    state: Rc<WatcherState>,
}

impl Watcher {
    /// Create a watcher without running it.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() -> Maybe<()> + 'static,
    {
        let state = Rc::new_cyclic(|this| WatcherState {
            callback: Box::new(callback),
            this: this.clone(),
            arguments: RefCell::new(IndexMap::new()),
            waiting: StdCell::new(0),
            changed: StdCell::new(false),
            running: StdCell::new(false),
            queued: StdCell::new(false),
            stopped: StdCell::new(true),
            run_count: StdCell::new(0),
        });
        Self { state }
    }

    /// Run the callback and start following the cells it reads. Does
    /// nothing if the watcher is already running.
    pub fn start(&self) {
        if self.state.stopped.replace(false) {
            self.state.run();
        }
    }

    /// Stop the watcher and release every cell it observes.
    pub fn stop(&self) {
        self.state.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.get()
    }

    /// Number of times the callback has run.
    pub fn run_count(&self) -> usize {
        self.state.run_count.get()
    }

    /// Number of cells read on the latest run.
    pub fn dependency_count(&self) -> usize {
        self.state.arguments.borrow().len()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.state.stop();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Create a watcher and run it right away.
pub fn watch<F>(callback: F) -> Watcher
where
    F: Fn() -> Maybe<()> + 'static,
{
    let watcher = Watcher::new(callback);
    watcher.start();
    watcher
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CellError;
    use crate::reactive::batch::batch;
    use crate::reactive::cell::Cell;
    use crate::reactive::compute::{computed, computed_with, ComputeOptions};
    use crate::reactive::mutable::variable;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn watcher_runs_on_start_and_on_change() {
        let a = variable(1);
        let run_count = Arc::new(AtomicI32::new(0));
        let watcher = watch({
            let (a, run_count) = (a.clone(), run_count.clone());
            move || {
                a.value()?;
                run_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.dependency_count(), 1);

        a.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);
        assert_eq!(watcher.run_count(), 2);

        // Equal values are not changes
        a.set(2);
        assert_eq!(watcher.run_count(), 2);
    }

    #[test]
    fn new_does_not_run_until_started() {
        let a = variable(1);
        let watcher = Watcher::new({
            let a = a.clone();
            move || a.value().map(drop)
        });

        assert!(watcher.is_stopped());
        a.set(2);
        assert_eq!(watcher.run_count(), 0);

        watcher.start();
        watcher.start();
        assert_eq!(watcher.run_count(), 1);
        assert!(!watcher.is_stopped());
    }

    #[test]
    fn diamond_runs_once_per_flush() {
        let a = variable(1);
        let b = computed({
            let a = a.clone();
            move || Ok(a.value()? * 2)
        });
        let c = computed({
            let a = a.clone();
            move || Ok(a.value()? + 1)
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let watcher = watch({
            let (b, c, seen) = (b.clone(), c.clone(), seen.clone());
            move || {
                seen.borrow_mut().push((b.value()?, c.value()?));
                Ok(())
            }
        });

        a.set(5);
        assert_eq!(watcher.run_count(), 2);
        assert_eq!(*seen.borrow(), vec![(2, 2), (10, 6)]);
    }

    #[test]
    fn batched_changes_run_once() {
        let a = variable(1);
        let b = variable(2);
        let watcher = watch({
            let (a, b) = (a.clone(), b.clone());
            move || {
                a.value()?;
                b.value()?;
                Ok(())
            }
        });

        batch(|| {
            a.set(10);
            b.set(20);
        });
        assert_eq!(watcher.run_count(), 2);
    }

    #[test]
    fn unchanged_computed_values_do_not_rerun() {
        let a = variable(1);
        let parity = computed_with(ComputeOptions::changes_only(), {
            let a = a.clone();
            move || Ok(a.value()? % 2)
        });
        let watcher = watch({
            let parity = parity.clone();
            move || parity.value().map(drop)
        });

        a.set(3);
        assert_eq!(watcher.run_count(), 1);
        a.set(4);
        assert_eq!(watcher.run_count(), 2);
    }

    #[test]
    fn dependencies_follow_the_latest_run() {
        let flag = variable(true);
        let a = variable(1);
        let b = variable(2);
        let watcher = watch({
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            move || {
                if flag.value()? {
                    a.value()?;
                } else {
                    b.value()?;
                }
                Ok(())
            }
        });

        let a_id = a.state().unwrap().node_id();
        assert!(Runtime::is_active(a_id));

        flag.set(false);
        assert_eq!(watcher.dependency_count(), 2);
        assert!(!Runtime::is_active(a_id));

        a.set(10);
        assert_eq!(watcher.run_count(), 2);
        b.set(20);
        assert_eq!(watcher.run_count(), 3);
    }

    #[test]
    fn stop_releases_everything() {
        let a = variable(1);
        let watcher = watch({
            let a = a.clone();
            move || a.value().map(drop)
        });
        let a_id = a.state().unwrap().node_id();
        assert!(Runtime::is_active(a_id));

        watcher.stop();
        assert!(watcher.is_stopped());
        assert_eq!(watcher.dependency_count(), 0);
        assert!(!Runtime::is_active(a_id));

        a.set(2);
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn dropping_stops_the_watcher() {
        let a = variable(1);
        let a_id = a.state().unwrap().node_id();
        {
            let _watcher = watch({
                let a = a.clone();
                move || a.value().map(drop)
            });
            assert!(Runtime::is_active(a_id));
        }
        assert!(!Runtime::is_active(a_id));
    }

    #[test]
    fn failures_do_not_stop_the_watcher() {
        let a = variable(1);
        let watcher = watch({
            let a = a.clone();
            move || {
                if a.value()? < 0 {
                    return Err(CellError::msg("negative"));
                }
                Ok(())
            }
        });

        a.set(-1);
        a.set(3);
        assert_eq!(watcher.run_count(), 3);
        assert_eq!(watcher.dependency_count(), 1);
    }

    #[test]
    fn writes_from_a_watcher_propagate() {
        let a = variable(1);
        let mirror = variable(0);
        let _watcher = watch({
            let (a, mirror) = (a.clone(), mirror.clone());
            move || {
                mirror.set(a.value()? * 10);
                Ok(())
            }
        });
        let doubled = computed({
            let mirror = mirror.clone();
            move || Ok(mirror.value()? * 2)
        });
        let seen = watch({
            let doubled = doubled.clone();
            move || doubled.value().map(drop)
        });

        assert_eq!(mirror.value(), Ok(10));
        a.set(2);
        assert_eq!(mirror.value(), Ok(20));
        assert_eq!(doubled.value(), Ok(40));
        assert_eq!(seen.run_count(), 2);
    }
}
