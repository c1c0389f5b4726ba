//! Cell Views
//!
//! A view is a two-way cell without a cache. Every read runs the forward
//! function again, and observers of the view are attached directly to the
//! view's arguments. Setting a view runs the reverse function in a batch;
//! the assigned value is not remembered, so the next read reflects whatever
//! the reverse function wrote.

use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::{CellError, Maybe};
use crate::key::Key;

use super::batch::batch;
use super::cell::{AnyCell, Cell, CellValue};
use super::context::ArgumentTracker;
use super::state::CellState;

/// An uncached two-way cell over a fixed list of arguments.
pub struct CellView<T> {
    key: Key,
    arguments: Rc<[AnyCell]>,
    forward: Rc<dyn Fn() -> Maybe<T>>,
    reverse: Rc<dyn Fn(T)>,
}

impl<T: CellValue> CellView<T> {
    /// Run the reverse function with `value`, in one batch.
    ///
    /// # Panics
    ///
    /// Panics if called while a compute function is running. Use
    /// [`try_set`](CellView::try_set) to handle that case.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    pub fn try_set(&self, value: T) -> Result<(), CellError> {
        if ArgumentTracker::computing().is_some() {
            return Err(CellError::ReentrantMutation { cell: self.key() });
        }

        batch(|| (self.reverse)(value));
        Ok(())
    }

    pub fn arguments(&self) -> &[AnyCell] {
        &self.arguments
    }
}

impl<T: CellValue> Cell for CellView<T> {
    type Value = T;

    fn key(&self) -> Key {
        self.key.clone()
    }

    fn state(&self) -> Option<Rc<dyn CellState>> {
        None
    }

    fn states(&self) -> Vec<Rc<dyn CellState>> {
        self.arguments
            .iter()
            .flat_map(AnyCell::states)
            .cloned()
            .collect()
    }

    fn value_untracked(&self) -> Maybe<T> {
        ArgumentTracker::untracked(|| (self.forward)())
    }
}

impl<T> Clone for CellView<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            arguments: Rc::clone(&self.arguments),
            forward: Rc::clone(&self.forward),
            reverse: Rc::clone(&self.reverse),
        }
    }
}

impl<T> Debug for CellView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellView")
            .field("key", &self.key)
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// Create a view computed by `forward` from `arguments`, written back
/// through `reverse`.
///
/// `forward` must only read cells listed in `arguments`.
pub fn cell_view<T, F, R>(arguments: Vec<AnyCell>, forward: F, reverse: R) -> CellView<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
    R: Fn(T) + 'static,
{
    cell_view_keyed(Key::unique(), arguments, forward, reverse)
}

/// Like [`cell_view`], identified by `key`. Views hold no state, so equal
/// keys only make the handles compare equal.
pub fn cell_view_keyed<T, F, R>(
    key: Key,
    arguments: Vec<AnyCell>,
    forward: F,
    reverse: R,
) -> CellView<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
    R: Fn(T) + 'static,
{
    CellView {
        key,
        arguments: arguments.into(),
        forward: Rc::new(forward),
        reverse: Rc::new(reverse),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
