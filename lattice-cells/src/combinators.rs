//! Cell combinators
//!
//! Small cells built from other cells: error recovery, conditional
//! selection, and turning failures into values.

use crate::error::{none, CellError, Maybe};
use crate::graph::NodeKind;
use crate::key::Key;
use crate::reactive::{
    computed_with, mutable_computed_keyed, Cell, CellValue, ComputeCell, ComputeOptions,
    ComputeState, MutableCell, MutableComputeCell, StateManager, Tracking,
};

fn lazy_cell<T, F>(key: Key, compute: F) -> ComputeCell<T>
where
    T: CellValue,
    F: Fn() -> Maybe<T> + 'static,
{
    let state = StateManager::get_or_create(&key, || {
        ComputeState::new(NodeKind::Derived, key.clone(), Tracking::Dynamic, Box::new(compute))
            .lazy()
            .register()
    });
    ComputeCell::from_state(state)
}

/// The value of `cell`, or of `fallback` when reading `cell` fails.
pub fn on_error<C, F>(cell: &C, fallback: &F) -> ComputeCell<C::Value>
where
    C: Cell,
    F: Cell<Value = C::Value>,
{
    let key = Key::value(("on_error", cell.key(), fallback.key()));
    let (cell, fallback) = (cell.clone(), fallback.clone());
    lazy_cell(key, move || cell.value().or_else(|_| fallback.value()))
}

/// Like [`on_error`], but only errors accepted by `catch` are replaced.
/// Other errors pass through.
pub fn on_error_if<C, F, P>(cell: &C, fallback: &F, catch: P) -> ComputeCell<C::Value>
where
    C: Cell,
    F: Cell<Value = C::Value>,
    P: Fn(&CellError) -> bool + 'static,
{
    let (cell, fallback) = (cell.clone(), fallback.clone());
    lazy_cell(Key::unique(), move || match cell.value() {
        Err(err) if catch(&err) => fallback.value(),
        result => result,
    })
}

/// `if_true` while `cond` holds, `if_false` otherwise.
pub fn select<B, C, D>(cond: &B, if_true: &C, if_false: &D) -> ComputeCell<C::Value>
where
    B: Cell<Value = bool>,
    C: Cell,
    D: Cell<Value = C::Value>,
{
    let key = Key::value(("select", cond.key(), if_true.key(), if_false.key()));
    let (cond, if_true, if_false) = (cond.clone(), if_true.clone(), if_false.clone());
    computed_with(ComputeOptions::keyed(key), move || {
        if cond.value()? {
            if_true.value()
        } else {
            if_false.value()
        }
    })
}

/// `if_true` while `cond` holds. When it does not, the cell keeps whatever
/// value it had.
pub fn select_if<B, C>(cond: &B, if_true: &C) -> ComputeCell<C::Value>
where
    B: Cell<Value = bool>,
    C: Cell,
{
    let key = Key::value(("select_if", cond.key(), if_true.key()));
    let (cond, if_true) = (cond.clone(), if_true.clone());
    computed_with(ComputeOptions::keyed(key), move || {
        if cond.value()? {
            if_true.value()
        } else {
            none()
        }
    })
}

/// A cell whose value is the outcome of reading `cell`. It never fails.
pub fn maybe_cell<C: Cell>(cell: &C) -> ComputeCell<Maybe<C::Value>> {
    let key = Key::derived("maybe", &cell.key());
    let cell = cell.clone();
    computed_with(ComputeOptions::keyed(key), move || Ok(cell.value()))
}

/// Two-way [`maybe_cell`] over a mutable cell. Assigning `Ok(v)` sets the
/// mutable cell to `v`; assigning an error leaves it alone.
pub fn maybe_mutable<T: CellValue>(cell: &MutableCell<T>) -> MutableComputeCell<Maybe<T>> {
    let key = Key::derived("maybe_mutable", &cell.key());
    let (forward, reverse) = (cell.clone(), cell.clone());
    mutable_computed_keyed(
        key,
        move || Ok(forward.value()),
        move |value: Maybe<T>| {
            if let Ok(value) = value {
                reverse.set(value);
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{computed, constant, value_cell, variable, Subscriber};
    use std::rc::Rc;

    fn checked(source: &MutableCell<i32>) -> ComputeCell<i32> {
        let source = source.clone();
        computed(move || {
            let value = source.value()?;
            if value < 0 {
                Err(CellError::msg("negative"))
            } else {
                Ok(value)
            }
        })
    }

    #[test]
    fn on_error_falls_back() {
        let source = variable(1);
        let checked = checked(&source);
        let fallback = value_cell(0);
        let safe = on_error(&checked, &fallback);

        assert_eq!(safe.value(), Ok(1));
        source.set(-5);
        assert_eq!(safe.value(), Ok(0));
        assert!(checked.value().is_err());
        assert_eq!(on_error(&checked, &fallback).key(), safe.key());
    }

    #[test]
    fn on_error_recovers_while_observed() {
        let source = variable(1);
        let checked = checked(&source);
        let safe = on_error(&checked, &value_cell(0));
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        safe.add_observer(subscriber.clone());

        source.set(-1);
        assert_eq!(safe.value(), Ok(0));
        source.set(7);
        assert_eq!(safe.value(), Ok(7));
        assert_eq!(subscriber.notifications(), 2);
    }

    #[test]
    fn equal_fallback_values_share_the_recovering_cell() {
        let source = variable(1);
        let checked = checked(&source);
        let safe = on_error(&checked, &value_cell(0));

        assert_eq!(on_error(&checked, &value_cell(0)).key(), safe.key());
        assert_ne!(on_error(&checked, &value_cell(1)).key(), safe.key());
        assert_ne!(on_error(&checked, &constant(0)).key(), safe.key());
    }

    #[test]
    fn on_error_if_only_catches_matching_errors() {
        let fallback = value_cell(42);
        let uninitialized = MutableCell::<i32>::uninitialized();
        let recovered = on_error_if(&uninitialized, &fallback, |err| {
            matches!(err, CellError::Uninitialized)
        });
        assert_eq!(recovered.value(), Ok(42));

        let source = variable(-1);
        let failing = checked(&source);
        let passed = on_error_if(&failing, &fallback, |err| {
            matches!(err, CellError::Uninitialized)
        });
        assert!(matches!(passed.value(), Err(CellError::ComputeFailed(_))));
    }

    #[test]
    fn select_switches_between_cells() {
        let cond = variable(true);
        let a = variable(1);
        let b = variable(2);
        let chosen = select(&cond, &a, &b);

        assert_eq!(chosen.value(), Ok(1));
        cond.set(false);
        assert_eq!(chosen.value(), Ok(2));
        assert_eq!(select(&cond, &a, &b).key(), chosen.key());
        assert_ne!(select(&cond, &b, &a).key(), chosen.key());
    }

    #[test]
    fn select_if_holds_its_value_while_false() {
        let cond = variable(true);
        let a = variable(1);
        let held = select_if(&cond, &a);
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        held.add_observer(subscriber.clone());

        cond.set(false);
        assert_eq!(held.value(), Ok(1));
        a.set(5);
        assert_eq!(held.value(), Ok(1));
        assert_eq!(subscriber.notifications(), 0);

        cond.set(true);
        assert_eq!(held.value(), Ok(5));
        assert_eq!(subscriber.notifications(), 1);
    }

    #[test]
    fn maybe_cell_turns_failures_into_values() {
        let source = variable(-1);
        let failing = checked(&source);
        let maybe = maybe_cell(&failing);

        assert!(matches!(maybe.value(), Ok(Err(CellError::ComputeFailed(_)))));
        source.set(3);
        assert_eq!(maybe.value(), Ok(Ok(3)));

        let empty = MutableCell::<i32>::uninitialized();
        assert_eq!(maybe_cell(&empty).value(), Ok(Err(CellError::Uninitialized)));
    }

    #[test]
    fn maybe_mutable_assigns_only_values() {
        let inner = MutableCell::<i32>::uninitialized();
        let maybe = maybe_mutable(&inner);
        assert_eq!(maybe.value(), Ok(Err(CellError::Uninitialized)));

        maybe.set(Ok(3));
        assert_eq!(inner.value(), Ok(3));

        maybe.set(Err(CellError::msg("ignored")));
        assert_eq!(inner.value(), Ok(3));
        assert_eq!(maybe.value(), Ok(Ok(3)));
    }
}
