//! The Cell Interface
//!
//! A cell is a handle to a value that may change over time. Handles are
//! cheap to clone: every clone refers to the same underlying state, and two
//! handles are the same cell when their keys are equal.
//!
//! Reading a cell with [`Cell::value`] inside a compute cell or watcher
//! registers it as an argument of that computation.

use std::any::{type_name, Any};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::{CellError, Maybe};
use crate::key::Key;

use super::context::ArgumentTracker;
use super::runtime::Runtime;
use super::state::CellState;
use super::subscriber::Observer;

/// Values that can be held by cells.
///
/// Equality is used to suppress notifications when a value is set or
/// recomputed to what it already was.
pub trait CellValue: Clone + PartialEq + 'static {}

impl<T> CellValue for T where T: Clone + PartialEq + 'static {}

/// A handle to a reactive value.
pub trait Cell: Clone + 'static {
    type Value: CellValue;

    /// The identity of this cell.
    fn key(&self) -> Key;

    /// The state behind this handle. Constant cells have none.
    fn state(&self) -> Option<Rc<dyn CellState>>;

    /// The states a read of this cell depends on.
    ///
    /// Usually the cell's own state. Cells without a cache report the
    /// states of their arguments instead.
    fn states(&self) -> Vec<Rc<dyn CellState>> {
        self.state().into_iter().collect()
    }

    /// Read the value without registering a dependency.
    fn value_untracked(&self) -> Maybe<Self::Value>;

    /// Read the value.
    ///
    /// Inside a compute cell or watcher, the cell becomes one of the
    /// computation's arguments.
    fn value(&self) -> Maybe<Self::Value> {
        for state in self.states() {
            ArgumentTracker::track(&state);
        }
        self.value_untracked()
    }

    /// Notify `observer` when this cell changes.
    fn add_observer(&self, observer: Rc<dyn Observer>) {
        for state in self.states() {
            Runtime::add_observer(&state, observer.clone());
        }
    }

    /// Undo one [`add_observer`](Cell::add_observer) call.
    fn remove_observer(&self, observer: &Rc<dyn Observer>) {
        for state in self.states() {
            Runtime::remove_observer(&state, observer);
        }
    }

    /// Erase the value type.
    fn to_any(&self) -> AnyCell {
        AnyCell::new(self.clone())
    }
}

type Reader<T> = Rc<dyn Fn() -> Maybe<T>>;

/// A cell with its value type erased.
///
/// Used where cells of different types are listed together, such as the
/// declared arguments of a static compute cell.
#[derive(Clone)]
pub struct AnyCell {
    key: Key,
    states: Vec<Rc<dyn CellState>>,
    reader: Rc<dyn Any>,
    value_type: &'static str,
}

impl AnyCell {
    pub fn new<C: Cell>(cell: C) -> Self {
        let key = cell.key();
        let states = cell.states();
        let reader: Reader<C::Value> = Rc::new(move || cell.value());

        Self {
            key,
            states,
            reader: Rc::new(reader),
            value_type: type_name::<C::Value>(),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The states reading this cell depends on. Empty for constants.
    pub fn states(&self) -> &[Rc<dyn CellState>] {
        &self.states
    }

    /// Read the value as a `T`.
    ///
    /// Fails with [`CellError::TypeMismatch`] if the cell holds another type.
    pub fn value<T: CellValue>(&self) -> Maybe<T> {
        match self.reader.downcast_ref::<Reader<T>>() {
            Some(read) => read(),
            None => Err(CellError::TypeMismatch {
                expected: type_name::<T>(),
                found: self.value_type,
            }),
        }
    }
}

impl PartialEq for AnyCell {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for AnyCell {}

impl Hash for AnyCell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for AnyCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyCell")
            .field("key", &self.key)
            .field("value_type", &self.value_type)
            .finish()
    }
}

/// A cell whose value never changes.
#[derive(Clone)]
pub struct ConstantCell<T> {
    key: Key,
    value: T,
}

impl<T: CellValue> Cell for ConstantCell<T> {
    type Value = T;

    fn key(&self) -> Key {
        self.key.clone()
    }

    fn state(&self) -> Option<Rc<dyn CellState>> {
        None
    }

    fn value_untracked(&self) -> Maybe<T> {
        Ok(self.value.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for ConstantCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantCell")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

/// A cell holding a constant value. Reading it never creates a dependency.
///
/// The cell is keyed by its value: two value cells holding equal values are
/// the same cell.
pub fn value_cell<T>(value: T) -> ConstantCell<T>
where
    T: CellValue + Hash + Eq + fmt::Debug,
{
    ConstantCell {
        key: Key::value(("value", value.clone())),
        value,
    }
}

/// A constant cell for values that cannot be hashed, such as `f64`. Every
/// call creates a distinct cell.
pub fn constant<T: CellValue>(value: T) -> ConstantCell<T> {
    ConstantCell {
        key: Key::unique(),
        value,
    }
}
