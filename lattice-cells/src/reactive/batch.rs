//! Batch Updates
//!
//! Inside a batch, mutable cells take their new values immediately and
//! compute cells read inside the batch already see them. What is deferred
//! is notification: observers hear about all the changes at once, when the
//! outermost batch ends, and every affected cell is brought up to date a
//! single time.

use crate::error::CellError;

use super::runtime::Runtime;

/// Guard for a batch. The batch ends when the guard is dropped.
///
/// # Example
///
/// ```rust
/// use lattice_cells::{variable, BatchUpdate, Cell};
///
/// let a = variable(1);
/// let b = variable(2);
/// {
///     let _batch = BatchUpdate::begin();
///     a.set(10);
///     b.set(20);
/// }
/// assert_eq!(a.value(), Ok(10));
/// ```
#[must_use = "the batch ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct BatchUpdate {
    _private: (),
}

impl BatchUpdate {
    pub fn begin() -> Self {
        Runtime::begin_batch();
        Self { _private: () }
    }
}

impl Drop for BatchUpdate {
    fn drop(&mut self) {
        // Each guard owns exactly one level, so this cannot be unbalanced.
        let _ = Runtime::end_batch();
    }
}

/// Run `f` inside a batch.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _batch = BatchUpdate::begin();
    f()
}

/// Open a batch without a guard. Must be paired with [`end_batch`].
pub fn begin_batch() {
    Runtime::begin_batch();
}

/// Close a batch opened with [`begin_batch`], flushing if it was the
/// outermost one.
pub fn end_batch() -> Result<(), CellError> {
    Runtime::end_batch()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::cell::Cell;
    use crate::reactive::compute::computed;
    use crate::reactive::mutable::variable;
    use crate::reactive::subscriber::Subscriber;
    use std::rc::Rc;

    #[test]
    fn nested_batches_flush_once_at_the_end() {
        let a = variable(0);
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        a.add_observer(subscriber.clone());

        batch(|| {
            a.set(1);
            batch(|| a.set(2));
            assert_eq!(subscriber.notifications(), 0);
            a.set(3);
        });

        assert_eq!(subscriber.notifications(), 1);
        assert_eq!(a.value(), Ok(3));
    }

    #[test]
    fn explicit_begin_and_end() {
        let a = variable(0);
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        a.add_observer(subscriber.clone());

        begin_batch();
        a.set(1);
        assert!(Runtime::is_batching());
        assert_eq!(end_batch(), Ok(()));

        assert!(!Runtime::is_batching());
        assert_eq!(subscriber.notifications(), 1);
        assert_eq!(end_batch(), Err(CellError::UnbalancedBatch));
    }

    #[test]
    fn reads_inside_a_batch_are_consistent() {
        let a = variable(1);
        let b = variable(2);
        let sum = computed({
            let (a, b) = (a.clone(), b.clone());
            move || Ok(a.value()? + b.value()?)
        });
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        sum.add_observer(subscriber.clone());

        batch(|| {
            a.set(10);
            assert_eq!(sum.value(), Ok(12));
            b.set(20);
            assert_eq!(sum.value(), Ok(30));
        });

        assert_eq!(subscriber.notifications(), 1);
        assert_eq!(sum.value(), Ok(30));
    }
}
