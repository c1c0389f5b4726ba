//! Mutable Cells
//!
//! A mutable cell is the fundamental source of change. It holds a value
//! that is set directly, and every cell computed from it is brought up to
//! date when it changes.
//!
//! # How Mutable Cells Work
//!
//! 1. When a mutable cell is read within a tracking scope (a compute cell
//!    or a watcher), it becomes an argument of that computation.
//!
//! 2. When its value is set to something different, the runtime marks all
//!    downstream cells stale and schedules a flush.
//!
//! 3. Outside a batch the flush runs before `set` returns.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::{CellError, Maybe};
use crate::graph::NodeKind;
use crate::key::Key;

use super::cell::{Cell, CellValue};
use super::context::ArgumentTracker;
use super::runtime::Runtime;
use super::state::{CellState, NodeHandle};
use super::state_manager::StateManager;

pub(crate) struct MutableState<T> {
    handle: NodeHandle,
    value: RefCell<Maybe<T>>,
}

impl<T: CellValue> MutableState<T> {
    fn new(key: Key, value: Maybe<T>) -> Rc<Self> {
        let state = Rc::new(Self {
            handle: NodeHandle::new(NodeKind::Source, key),
            value: RefCell::new(value),
        });
        Runtime::register(&state);
        state
    }
}

impl<T: CellValue> CellState for MutableState<T> {
    fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

/// A cell whose value is set directly.
///
/// # Example
///
/// ```rust
/// use lattice_cells::{variable, Cell};
///
/// let count = variable(0);
/// count.set(5);
/// assert_eq!(count.value(), Ok(5));
/// ```
pub struct MutableCell<T> {
    state: Rc<MutableState<T>>,
}

impl<T: CellValue> MutableCell<T> {
    /// Create a new mutable cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            state: MutableState::new(Key::unique(), Ok(value)),
        }
    }

    /// Create a mutable cell with no value. Reading it fails with
    /// [`CellError::Uninitialized`] until it is set.
    pub fn uninitialized() -> Self {
        Self {
            state: MutableState::new(Key::unique(), Err(CellError::Uninitialized)),
        }
    }

    /// Get the mutable cell identified by `key`, creating it with `value`
    /// if no live cell has that key. An existing cell keeps its value.
    pub fn keyed(key: Key, value: T) -> Self {
        let state = StateManager::get_or_create(&key, || MutableState::new(key.clone(), Ok(value)));
        Self { state }
    }

    /// Set a new value and notify observers if it differs from the old one.
    ///
    /// # Panics
    ///
    /// Panics if called while a compute function is running. Use
    /// [`try_set`](MutableCell::try_set) to handle that case.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    /// Set a new value, reporting misuse instead of panicking.
    pub fn try_set(&self, value: T) -> Result<(), CellError> {
        if ArgumentTracker::computing().is_some() {
            return Err(CellError::ReentrantMutation { cell: self.key() });
        }

        let unchanged = matches!(&*self.state.value.borrow(), Ok(old) if *old == value);
        if unchanged && !Runtime::config().notify_on_equal_set {
            return Ok(());
        }

        *self.state.value.borrow_mut() = Ok(value);
        Runtime::source_changed(self.state.node_id());
        Ok(())
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = match &*self.state.value.borrow() {
            Ok(current) => f(current),
            Err(_) => return,
        };
        self.set(next);
    }

    /// Replace the value without notifying anyone.
    ///
    /// Cells that already read the old value keep it until something
    /// else makes them recompute.
    pub fn silent_set(&self, value: T) {
        *self.state.value.borrow_mut() = Ok(value);
    }
}

impl<T: CellValue> Cell for MutableCell<T> {
    type Value = T;

    fn key(&self) -> Key {
        self.state.key()
    }

    fn state(&self) -> Option<Rc<dyn CellState>> {
        Some(self.state.clone())
    }

    fn value_untracked(&self) -> Maybe<T> {
        self.state.value.borrow().clone()
    }
}

impl<T> Clone for MutableCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: CellValue + Debug> Debug for MutableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableCell")
            .field("key", &self.state.key())
            .field("value", &*self.state.value.borrow())
            .finish()
    }
}

/// Create a mutable cell holding `value`.
pub fn variable<T: CellValue>(value: T) -> MutableCell<T> {
    MutableCell::new(value)
}

/// Get or create the mutable cell identified by `key`.
pub fn variable_keyed<T: CellValue>(key: Key, value: T) -> MutableCell<T> {
    MutableCell::keyed(key, value)
}
