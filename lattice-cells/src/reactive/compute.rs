//! Compute Cells
//!
//! A compute cell derives its value from other cells and caches it while
//! it is active.
//!
//! # How Compute Cells Work
//!
//! 1. A compute cell is inactive until something observes it. While
//!    inactive it holds no subscriptions and recomputes on every read.
//!
//! 2. On activation, a dynamic cell runs its function once to discover the
//!    cells it reads; a static cell subscribes to the arguments it was
//!    given.
//!
//! 3. When an upstream source changes, the cell is marked stale at once. A
//!    read while stale recomputes, so values read inside a batch are
//!    already consistent.
//!
//! 4. During the flush the cell is visited once. It recomputes only if one
//!    of its arguments reported a change, and tells its observers whether
//!    its own value changed.
//!
//! # Aborting
//!
//! A compute function may return [`none()`](crate::none) to keep its
//! previous value. Nothing downstream is told about a change.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::rc::Rc;

use indexmap::IndexSet;

use crate::error::{CellError, Maybe};
use crate::graph::{NodeId, NodeKind};
use crate::key::Key;

use super::cell::{AnyCell, Cell, CellValue};
use super::context::{ArgumentTracker, TrackTarget};
use super::runtime::Runtime;
use super::state::{CellState, NodeHandle, Phase};
use super::state_manager::StateManager;

/// How a compute cell finds its arguments.
pub(crate) enum Tracking {
    /// Whatever the function reads on its latest run.
    Dynamic,

    /// A fixed list given when the cell was created.
    Static(Vec<AnyCell>),
}

struct ComputeInner<T> {
    value: Option<Maybe<T>>,
    phase: Phase,
    active: bool,

    /// Arguments currently subscribed to, for dynamic cells.
    arguments: IndexSet<NodeId>,

    /// Set when a recompute produced a change not yet reported to a flush.
    pending_change: bool,

    /// Whether the current round of propagation has started for this cell.
    in_cycle: bool,

    /// Whether the cached value was valid when the round started.
    clean_before: bool,
}

pub(crate) struct ComputeState<T> {
    handle: NodeHandle,
    compute: Box<dyn Fn() -> Maybe<T>>,
    reverse: Option<Box<dyn Fn(T)>>,
    tracking: Tracking,
    changes_only: bool,
    eager: bool,
    inner: RefCell<ComputeInner<T>>,
}

impl<T: CellValue> ComputeState<T> {
    pub(crate) fn new(
        kind: NodeKind,
        key: Key,
        tracking: Tracking,
        compute: Box<dyn Fn() -> Maybe<T>>,
    ) -> Self {
        Self {
            handle: NodeHandle::new(kind, key),
            compute,
            reverse: None,
            tracking,
            changes_only: false,
            eager: true,
            inner: RefCell::new(ComputeInner {
                value: None,
                phase: Phase::Stale,
                active: false,
                arguments: IndexSet::new(),
                pending_change: false,
                in_cycle: false,
                clean_before: false,
            }),
        }
    }

    /// Only report a change when the recomputed value differs.
    pub(crate) fn changes_only(mut self, changes_only: bool) -> Self {
        self.changes_only = changes_only;
        self
    }

    /// Defer recomputation to the next read instead of the flush.
    pub(crate) fn lazy(mut self) -> Self {
        self.eager = false;
        self
    }

    pub(crate) fn with_reverse(mut self, reverse: Box<dyn Fn(T)>) -> Self {
        self.reverse = Some(reverse);
        self
    }

    pub(crate) fn register(self) -> Rc<Self> {
        let state = Rc::new(self);
        Runtime::register(&state);
        state
    }

    /// The current value, recomputing if it is not known to be fresh.
    pub(crate) fn value(&self) -> Maybe<T> {
        {
            let inner = self.inner.borrow();
            match inner.phase {
                Phase::Computing => {
                    return Err(CellError::CyclicDependency { cell: self.key() });
                }
                Phase::Clean => {
                    if let Some(value) = &inner.value {
                        return value.clone();
                    }
                }
                Phase::Stale => {}
            }
        }

        self.recompute();
        self.inner
            .borrow()
            .value
            .clone()
            .unwrap_or(Err(CellError::Uninitialized))
    }

    /// Store a value assigned from outside, as two-way cells do.
    pub(crate) fn assign(&self, value: T) {
        let mut inner = self.inner.borrow_mut();
        inner.value = Some(Ok(value));
        inner.phase = if inner.active { Phase::Clean } else { Phase::Stale };
    }

    pub(crate) fn reverse(&self, value: T) {
        if let Some(reverse) = &self.reverse {
            reverse(value);
        }
    }

    fn recompute(&self) {
        let id = self.node_id();
        let (active, known) = {
            let mut inner = self.inner.borrow_mut();
            inner.phase = Phase::Computing;
            let known: HashSet<NodeId> = if inner.active {
                inner.arguments.iter().copied().collect()
            } else {
                HashSet::new()
            };
            (inner.active, known)
        };

        let result = match &self.tracking {
            Tracking::Dynamic => {
                let target = if active {
                    TrackTarget::Node(id)
                } else {
                    TrackTarget::Detached
                };
                let scope = ArgumentTracker::enter(target, Some(id), known);
                let result = (self.compute)();
                let tracked = scope.finish();
                if active {
                    self.retarget(tracked.keys().copied().collect());
                }
                result
            }
            Tracking::Static(_) => {
                let _scope =
                    ArgumentTracker::enter(TrackTarget::Untracked, Some(id), HashSet::new());
                (self.compute)()
            }
        };

        let mut inner = self.inner.borrow_mut();
        match result {
            Err(CellError::ComputeAborted) => {
                if inner.value.is_none() {
                    inner.value = Some(Err(CellError::Uninitialized));
                }
            }
            result => {
                let changed = !self.changes_only || inner.value.as_ref() != Some(&result);
                inner.pending_change |= changed;
                inner.value = Some(result);
            }
        }
        inner.phase = if inner.active { Phase::Clean } else { Phase::Stale };
    }

    /// Replace the subscribed arguments with the ones read on the last run.
    fn retarget(&self, arguments: IndexSet<NodeId>) {
        let removed: Vec<NodeId> = {
            let mut inner = self.inner.borrow_mut();
            let old = std::mem::replace(&mut inner.arguments, arguments);
            old.into_iter()
                .filter(|id| !inner.arguments.contains(id))
                .collect()
        };

        let id = self.node_id();
        for argument in removed {
            Runtime::remove_dependency(argument, id);
        }
    }

    fn finish_cycle(inner: &mut ComputeInner<T>) -> bool {
        let changed = inner.pending_change;
        inner.pending_change = false;
        inner.in_cycle = false;
        inner.clean_before = false;
        changed
    }
}

impl<T: CellValue> CellState for ComputeState<T> {
    fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    fn init(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.active = true;
            inner.phase = Phase::Stale;
            inner.clean_before = false;
        }

        match &self.tracking {
            Tracking::Dynamic => self.recompute(),
            Tracking::Static(arguments) => {
                let id = self.node_id();
                for state in arguments.iter().flat_map(AnyCell::states) {
                    Runtime::add_dependency(state, id);
                }
            }
        }
    }

    fn pause(&self) {
        let arguments = {
            let mut inner = self.inner.borrow_mut();
            inner.active = false;
            inner.phase = Phase::Stale;
            inner.clean_before = false;
            std::mem::take(&mut inner.arguments)
        };

        let id = self.node_id();
        match &self.tracking {
            Tracking::Dynamic => {
                for argument in arguments {
                    Runtime::remove_dependency(argument, id);
                }
            }
            Tracking::Static(declared) => {
                for state in declared.iter().flat_map(AnyCell::states) {
                    Runtime::remove_dependency(state.node_id(), id);
                }
            }
        }
    }

    fn mark_stale(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.in_cycle {
            inner.in_cycle = true;
            inner.pending_change = false;
            inner.clean_before = inner.phase == Phase::Clean;
        }
        if inner.phase == Phase::Clean {
            inner.phase = Phase::Stale;
        }
    }

    fn resolve(&self) -> bool {
        if !self.eager {
            let mut inner = self.inner.borrow_mut();
            let stale = inner.phase == Phase::Stale;
            return Self::finish_cycle(&mut inner) || stale;
        }

        if self.inner.borrow().phase == Phase::Stale {
            self.recompute();
        }
        Self::finish_cycle(&mut self.inner.borrow_mut())
    }

    fn settle(&self) {
        let mut inner = self.inner.borrow_mut();
        let unchanged = inner.clean_before && inner.active && inner.value.is_some();
        if inner.phase == Phase::Stale && unchanged {
            inner.phase = Phase::Clean;
        }
        Self::finish_cycle(&mut inner);
    }

    fn phase(&self) -> Phase {
        self.inner.borrow().phase
    }
}

/// Options for building a compute cell.
#[derive(Debug, Clone, Default)]
pub struct ComputeOptions {
    /// Share the cell's state with every other compute cell built with an
    /// equal key.
    pub key: Option<Key>,

    /// Only notify observers when the computed value actually changes.
    pub changes_only: bool,
}

impl ComputeOptions {
    pub fn keyed(key: Key) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    pub fn changes_only() -> Self {
        Self {
            changes_only: true,
            ..Self::default()
        }
    }
}

/// A cell whose value is computed from other cells.
///
/// # Example
///
/// ```rust
/// use lattice_cells::{computed, variable, Cell};
///
/// let a = variable(1);
/// let b = variable(2);
/// let sum = computed({
///     let (a, b) = (a.clone(), b.clone());
///     move || Ok(a.value()? + b.value()?)
/// });
///
/// assert_eq!(sum.value(), Ok(3));
/// a.set(5);
/// assert_eq!(sum.value(), Ok(7));
/// ```
pub struct ComputeCell<T> {
    pub(crate) state: Rc<ComputeState<T>>,
}

impl<T: CellValue> ComputeCell<T> {
    pub(crate) fn from_state(state: Rc<ComputeState<T>>) -> Self {
        Self { state }
    }

    /// Where the cached value stands.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }
}

impl<T: CellValue> Cell for ComputeCell<T> {
    type Value = T;

    fn key(&self) -> Key {
        self.state.key()
    }

    fn state(&self) -> Option<Rc<dyn CellState>> {
        Some(self.state.clone())
    }

    fn value_untracked(&self) -> Maybe<T> {
        self.state.value()
    }
}

impl<T> Clone for ComputeCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: CellValue> Debug for ComputeCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeCell")
            .field("key", &self.state.key())
            .field("phase", &self.state.phase())
            .finish()
    }
}

fn build<T, F>(options: ComputeOptions, tracking: Tracking, compute: F) -> ComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
{
    let key = options.key.unwrap_or_else(Key::unique);
    let state = StateManager::get_or_create(&key, || {
        ComputeState::new(NodeKind::Derived, key.clone(), tracking, Box::new(compute))
            .changes_only(options.changes_only)
            .register()
    });
    ComputeCell::from_state(state)
}

/// Create a compute cell whose arguments are the cells `compute` reads.
pub fn computed<T, F>(compute: F) -> ComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
{
    build(ComputeOptions::default(), Tracking::Dynamic, compute)
}

/// Create a dynamic compute cell with a key and/or change filtering.
pub fn computed_with<T, F>(options: ComputeOptions, compute: F) -> ComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
{
    build(options, Tracking::Dynamic, compute)
}

/// Create a compute cell with a fixed list of arguments.
///
/// `compute` must only read cells listed in `arguments`. Reads are not
/// tracked, so other cells it reads will not trigger recomputation.
pub fn computed_static<T, F>(arguments: Vec<AnyCell>, compute: F) -> ComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
{
    build(ComputeOptions::default(), Tracking::Static(arguments), compute)
}

pub fn computed_static_with<T, F>(
    options: ComputeOptions,
    arguments: Vec<AnyCell>,
    compute: F,
) -> ComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
{
    build(options, Tracking::Static(arguments), compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::none;
    use crate::reactive::mutable::variable;
    use crate::reactive::subscriber::Subscriber;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counted<F>(count: &Arc<AtomicI32>, f: F) -> impl Fn() -> Maybe<i32> + 'static
    where
        F: Fn() -> Maybe<i32> + 'static,
    {
        let count = count.clone();
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            f()
        }
    }

    #[test]
    fn inactive_cells_recompute_on_every_read() {
        let a = variable(2);
        let count = Arc::new(AtomicI32::new(0));
        let doubled = computed(counted(&count, {
            let a = a.clone();
            move || Ok(a.value()? * 2)
        }));

        assert_eq!(doubled.value(), Ok(4));
        assert_eq!(doubled.value(), Ok(4));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(doubled.phase(), Phase::Stale);
        assert!(!Runtime::is_active(a.state().unwrap().node_id()));
    }

    #[test]
    fn active_cells_cache_and_recompute_on_change() {
        let a = variable(2);
        let count = Arc::new(AtomicI32::new(0));
        let doubled = computed(counted(&count, {
            let a = a.clone();
            move || Ok(a.value()? * 2)
        }));
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        doubled.add_observer(subscriber.clone());

        // Activation computes once
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(doubled.value(), Ok(4));
        assert_eq!(doubled.value(), Ok(4));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        a.set(5);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(doubled.value(), Ok(10));
        assert_eq!(subscriber.notifications(), 1);
    }

    #[test]
    fn dynamic_arguments_follow_branches() {
        let flag = variable(true);
        let a = variable(1);
        let b = variable(2);
        let pick = computed({
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            move || if flag.value()? { a.value() } else { b.value() }
        });
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        pick.add_observer(subscriber.clone());

        let a_id = a.state().unwrap().node_id();
        let b_id = b.state().unwrap().node_id();
        assert!(Runtime::is_active(a_id));
        assert!(!Runtime::is_active(b_id));

        flag.set(false);
        assert_eq!(pick.value(), Ok(2));
        assert!(!Runtime::is_active(a_id));
        assert!(Runtime::is_active(b_id));

        a.set(10);
        assert_eq!(subscriber.notifications(), 1);
        b.set(20);
        assert_eq!(subscriber.notifications(), 2);
    }

    #[test]
    fn changes_only_cells_suppress_equal_results() {
        let a = variable(1);
        let parity = computed_with(ComputeOptions::changes_only(), {
            let a = a.clone();
            move || Ok(a.value()? % 2)
        });
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        parity.add_observer(subscriber.clone());

        a.set(3);
        assert_eq!(subscriber.notifications(), 0);

        a.set(4);
        assert_eq!(subscriber.notifications(), 1);
        assert_eq!(parity.value(), Ok(0));
    }

    #[test]
    fn abort_keeps_previous_value() {
        let a = variable(4);
        let even = computed({
            let a = a.clone();
            move || {
                let value = a.value()?;
                if value % 2 == 0 {
                    Ok(value)
                } else {
                    none()
                }
            }
        });
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        even.add_observer(subscriber.clone());

        a.set(5);
        assert_eq!(even.value(), Ok(4));
        assert_eq!(subscriber.notifications(), 0);

        a.set(6);
        assert_eq!(even.value(), Ok(6));
        assert_eq!(subscriber.notifications(), 1);
    }

    #[test]
    fn abort_without_previous_value_is_uninitialized() {
        let cell = computed(none::<i32>);
        assert_eq!(cell.value(), Err(CellError::Uninitialized));
    }

    #[test]
    fn failures_propagate_through_reads() {
        let failing = computed(|| -> Maybe<i32> { Err(CellError::msg("bad input")) });
        let downstream = computed({
            let failing = failing.clone();
            move || Ok(failing.value()? + 1)
        });

        let err = downstream.value().unwrap_err();
        assert!(err.failure().is_some());
        assert_eq!(err.to_string(), "compute function failed: bad input");
    }

    #[test]
    fn reading_itself_is_a_cycle() {
        let slot: Rc<RefCell<Option<ComputeCell<i32>>>> = Rc::new(RefCell::new(None));
        let cell = computed({
            let slot = slot.clone();
            move || match slot.borrow().as_ref() {
                Some(me) => Ok(me.value()? + 1),
                None => Ok(0),
            }
        });
        *slot.borrow_mut() = Some(cell.clone());

        assert_eq!(
            cell.value(),
            Err(CellError::CyclicDependency { cell: cell.key() })
        );
    }

    #[test]
    fn setting_inside_compute_is_rejected() {
        let target = variable(0);
        let cell = computed({
            let target = target.clone();
            move || match target.try_set(1) {
                Ok(()) => Ok(true),
                Err(CellError::ReentrantMutation { .. }) => Ok(false),
                Err(err) => Err(err),
            }
        });

        assert_eq!(cell.value(), Ok(false));
        assert_eq!(target.value(), Ok(0));
    }

    #[test]
    fn keyed_cells_share_state() {
        let a = variable(3);
        let make = || {
            let a = a.clone();
            computed_with(ComputeOptions::keyed(Key::value(("square", 1))), move || {
                Ok(a.value()? * a.value()?)
            })
        };

        let first = make();
        let second = make();
        assert!(Rc::ptr_eq(&first.state, &second.state));
        assert_eq!(second.value(), Ok(9));
    }

    #[test]
    fn static_cells_only_see_declared_arguments() {
        let a = variable(1);
        let hidden = variable(100);
        let count = Arc::new(AtomicI32::new(0));
        let sum = computed_static(
            vec![a.to_any()],
            counted(&count, {
                let (a, hidden) = (a.clone(), hidden.clone());
                move || Ok(a.value()? + hidden.value()?)
            }),
        );
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        sum.add_observer(subscriber.clone());

        // Static cells compute on first read, not on activation
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(sum.value(), Ok(101));

        hidden.set(200);
        assert_eq!(subscriber.notifications(), 0);
        assert_eq!(sum.value(), Ok(101));

        a.set(2);
        assert_eq!(subscriber.notifications(), 1);
        assert_eq!(sum.value(), Ok(202));
    }

    #[test]
    fn dropping_the_last_observer_releases_arguments() {
        let a = variable(1);
        let cell = computed({
            let a = a.clone();
            move || a.value()
        });
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        let observer: Rc<dyn crate::reactive::Observer> = subscriber;

        cell.add_observer(observer.clone());
        let a_id = a.state().unwrap().node_id();
        assert!(Runtime::is_active(a_id));

        cell.remove_observer(&observer);
        assert!(!Runtime::is_active(a_id));
        assert_eq!(cell.phase(), Phase::Stale);
    }
}
