//! Mutable Compute Cells
//!
//! A two-way cell: its value is computed from other cells like any compute
//! cell, but it can also be set. Setting it runs a reverse function that
//! writes back to the cells it is computed from.
//!
//! The assigned value is kept as-is. The writes made by the reverse
//! function do not cause the cell to recompute from them, which matters
//! when the forward and reverse functions are not exact inverses.

use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::{CellError, Maybe};
use crate::graph::NodeKind;
use crate::key::Key;

use super::batch::BatchUpdate;
use super::cell::{AnyCell, Cell, CellValue};
use super::compute::{ComputeState, Tracking};
use super::context::ArgumentTracker;
use super::runtime::Runtime;
use super::state::{CellState, Phase};
use super::state_manager::StateManager;

/// A computed cell that can also be set.
///
/// # Example
///
/// ```rust
/// use lattice_cells::{mutable_computed, variable, Cell};
///
/// let celsius = variable(100.0);
/// let fahrenheit = mutable_computed(
///     {
///         let c = celsius.clone();
///         move || Ok(c.value()? * 9.0 / 5.0 + 32.0)
///     },
///     {
///         let c = celsius.clone();
///         move |f: f64| c.set((f - 32.0) * 5.0 / 9.0)
///     },
/// );
///
/// fahrenheit.set(32.0);
/// assert_eq!(celsius.value(), Ok(0.0));
/// ```
pub struct MutableComputeCell<T> {
    state: Rc<ComputeState<T>>,
}

impl<T: CellValue> MutableComputeCell<T> {
    /// Assign a value and run the reverse function, all in one batch.
    ///
    /// # Panics
    ///
    /// Panics if called while a compute function is running. Use
    /// [`try_set`](MutableComputeCell::try_set) to handle that case.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    pub fn try_set(&self, value: T) -> Result<(), CellError> {
        if ArgumentTracker::computing().is_some() {
            return Err(CellError::ReentrantMutation { cell: self.key() });
        }

        let _batch = BatchUpdate::begin();
        self.state.assign(value.clone());
        Runtime::source_changed(self.state.node_id());
        self.state.reverse(value);
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }
}

impl<T: CellValue> Cell for MutableComputeCell<T> {
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

impl<T> Clone for MutableComputeCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: CellValue> Debug for MutableComputeCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableComputeCell")
            .field("key", &self.state.key())
            .field("phase", &self.state.phase())
            .finish()
    }
}

fn build<T, F, R>(key: Key, tracking: Tracking, forward: F, reverse: R) -> MutableComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
    R: Fn(T) + 'static,
{
    let state = StateManager::get_or_create(&key, || {
        ComputeState::new(NodeKind::TwoWay, key.clone(), tracking, Box::new(forward))
            .with_reverse(Box::new(reverse))
            .register()
    });
    MutableComputeCell { state }
}

/// Create a two-way cell whose arguments are the cells `forward` reads.
pub fn mutable_computed<T, F, R>(forward: F, reverse: R) -> MutableComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
    R: Fn(T) + 'static,
{
    build(Key::unique(), Tracking::Dynamic, forward, reverse)
}

/// Get or create the dynamic two-way cell identified by `key`.
pub fn mutable_computed_keyed<T, F, R>(key: Key, forward: F, reverse: R) -> MutableComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
    R: Fn(T) + 'static,
{
    build(key, Tracking::Dynamic, forward, reverse)
}

/// Create a two-way cell with a fixed list of arguments.
pub fn mutable_computed_static<T, F, R>(
    arguments: Vec<AnyCell>,
    forward: F,
    reverse: R,
) -> MutableComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
    R: Fn(T) + 'static,
{
    build(Key::unique(), Tracking::Static(arguments), forward, reverse)
}

pub fn mutable_computed_static_keyed<T, F, R>(
    key: Key,
    arguments: Vec<AnyCell>,
    forward: F,
    reverse: R,
) -> MutableComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
    R: Fn(T) + 'static,
{
    build(key, Tracking::Static(arguments), forward, reverse)
}
