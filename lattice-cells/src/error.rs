//! Error Types
//!
//! Every cell read produces a [`Maybe`]: either the cell's value or the
//! [`CellError`] that prevented computing it. Failures are ordinary values.
//! They flow from a compute function through `?` into every cell that reads
//! it, until something like `on_error` replaces them.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::key::Key;

/// The result of reading a cell.
pub type Maybe<T> = Result<T, CellError>;

/// Errors produced while reading, computing or mutating cells.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    /// The cell was read before it was ever given a value.
    #[error("cell read before it was initialized")]
    Uninitialized,

    /// A dynamically typed cell was read as the wrong value type.
    #[error("cell holds values of type `{found}`, not `{expected}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A compute function returned an error.
    #[error("compute function failed: {0}")]
    ComputeFailed(ComputeFailure),

    /// A compute function asked to keep its previous value.
    ///
    /// Produced by [`none`]. Readers never see this variant: the aborting
    /// cell retains its previous value instead.
    #[error("computation aborted")]
    ComputeAborted,

    /// A cell was assigned while a compute function was running.
    #[error("cell {cell:?} was set while a compute function was running")]
    ReentrantMutation { cell: Key },

    /// A cell was read while it was computing its own value.
    #[error("cell {cell:?} was read while computing its own value")]
    CyclicDependency { cell: Key },

    /// `end_batch` was called with no batch open.
    #[error("end_batch called without a matching begin_batch")]
    UnbalancedBatch,
}

impl CellError {
    /// Wrap an arbitrary error as a compute failure.
    pub fn failed<E>(error: E) -> Self
    where
        E: StdError + 'static,
    {
        CellError::ComputeFailed(ComputeFailure(Rc::new(error)))
    }

    /// Build a compute failure from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::failed(Message(message.into()))
    }

    /// The captured compute failure, if this is one.
    pub fn failure(&self) -> Option<&ComputeFailure> {
        match self {
            CellError::ComputeFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// An error returned by a compute function, shared by every cell it
/// propagates through.
///
/// Two failures are equal only if they are the same captured error.
#[derive(Clone)]
pub struct ComputeFailure(Rc<dyn StdError>);

impl ComputeFailure {
    /// Downcast to the concrete error type the compute function returned.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    pub fn get(&self) -> &(dyn StdError + 'static) {
        &*self.0
    }
}

impl PartialEq for ComputeFailure {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.0) as *const () == Rc::as_ptr(&other.0) as *const ()
    }
}

impl fmt::Debug for ComputeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ComputeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// Abort the current computation and keep the cell's previous value.
///
/// Return this from a compute function when there is nothing new to
/// report. A cell that aborts before ever producing a value reads as
/// [`CellError::Uninitialized`].
pub fn none<T>() -> Maybe<T> {
    Err(CellError::ComputeAborted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("parse error at {0}")]
    struct ParseError(usize);

    #[test]
    fn failures_compare_by_identity() {
        let a = CellError::msg("boom");
        let b = CellError::msg("boom");

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn failure_downcasts_to_source_error() {
        let err = CellError::failed(ParseError(7));
        let failure = err.failure().unwrap();

        assert_eq!(failure.downcast_ref::<ParseError>(), Some(&ParseError(7)));
        assert!(failure.downcast_ref::<std::fmt::Error>().is_none());
        assert_eq!(err.to_string(), "compute function failed: parse error at 7");
    }

    #[test]
    fn structural_variants_compare_by_value() {
        assert_eq!(CellError::Uninitialized, CellError::Uninitialized);
        assert_ne!(CellError::Uninitialized, CellError::ComputeAborted);
        assert_eq!(
            CellError::TypeMismatch { expected: "i32", found: "u8" },
            CellError::TypeMismatch { expected: "i32", found: "u8" },
        );
    }

    #[test]
    fn none_aborts() {
        assert_eq!(none::<i32>(), Err(CellError::ComputeAborted));
    }
}
