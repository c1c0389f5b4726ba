//! Previous-value cells
//!
//! [`previous`] remembers the value a cell had before its latest change.
//! History is only kept while the previous cell is active: an inactive
//! previous cell has nothing to report.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::{CellError, Maybe};
use crate::graph::NodeKind;
use crate::key::Key;

use super::cell::Cell;
use super::runtime::Runtime;
use super::state::{CellState, NodeHandle};
use super::state_manager::StateManager;

struct History<T> {
    previous: Option<Maybe<T>>,
    current: Option<Maybe<T>>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            previous: None,
            current: None,
        }
    }
}

struct PreviousState<C: Cell> {
    handle: NodeHandle,
    cell: C,
    history: RefCell<History<C::Value>>,
}

impl<C: Cell> PreviousState<C> {
    fn value(&self) -> Maybe<C::Value> {
        self.history
            .borrow()
            .previous
            .clone()
            .unwrap_or(Err(CellError::Uninitialized))
    }
}

impl<C: Cell> CellState for PreviousState<C> {
    fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    fn init(&self) {
        for state in self.cell.states() {
            Runtime::add_dependency(&state, self.node_id());
        }
        let current = self.cell.value_untracked();
        *self.history.borrow_mut() = History {
            previous: None,
            current: Some(current),
        };
    }

    fn pause(&self) {
        for state in self.cell.states() {
            Runtime::remove_dependency(state.node_id(), self.node_id());
        }
        *self.history.borrow_mut() = History::default();
    }

    fn resolve(&self) -> bool {
        let latest = self.cell.value_untracked();
        let mut history = self.history.borrow_mut();

        match history.current.take() {
            Some(current) if current != latest => {
                history.previous = Some(current);
                history.current = Some(latest);
                true
            }
            current => {
                history.current = current.or(Some(latest));
                false
            }
        }
    }
}

/// A cell holding the value another cell had before its latest change.
pub struct PreviousCell<C: Cell> {
    state: Rc<PreviousState<C>>,
}

impl<C: Cell> Cell for PreviousCell<C> {
    type Value = C::Value;

    fn key(&self) -> Key {
        self.state.key()
    }

    fn state(&self) -> Option<Rc<dyn CellState>> {
        Some(self.state.clone())
    }

    fn value_untracked(&self) -> Maybe<C::Value> {
        self.state.value()
    }
}

impl<C: Cell> Clone for PreviousCell<C> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<C: Cell> Debug for PreviousCell<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviousCell")
            .field("key", &self.state.key())
            .finish()
    }
}

/// Track the previous value of `cell`.
///
/// Yields [`CellError::Uninitialized`] until `cell` has changed at least
/// once while the previous cell was active.
pub fn previous<C: Cell>(cell: &C) -> PreviousCell<C> {
    let key = Key::derived("previous", &cell.key());
    let state = StateManager::get_or_create(&key, || {
        let state = Rc::new(PreviousState {
            handle: NodeHandle::new(NodeKind::Derived, key.clone()),
            cell: cell.clone(),
            history: RefCell::new(History::default()),
        });
        Runtime::register(&state);
        state
    });
    PreviousCell { state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::batch::batch;
    use crate::reactive::mutable::variable;
    use crate::reactive::subscriber::Subscriber;

    #[test]
    fn uninitialized_until_the_first_change() {
        let a = variable(1);
        let prev = previous(&a);
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        prev.add_observer(subscriber.clone());

        assert_eq!(prev.value(), Err(CellError::Uninitialized));

        a.set(2);
        assert_eq!(prev.value(), Ok(1));
        assert_eq!(subscriber.notifications(), 1);

        a.set(3);
        assert_eq!(prev.value(), Ok(2));
        assert_eq!(subscriber.notifications(), 2);
    }

    #[test]
    fn a_batch_is_one_generation() {
        let a = variable(1);
        let prev = previous(&a);
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        prev.add_observer(subscriber.clone());

        batch(|| {
            a.set(2);
            a.set(3);
        });

        assert_eq!(prev.value(), Ok(1));
        assert_eq!(subscriber.notifications(), 1);
    }

    #[test]
    fn inactive_previous_cells_keep_no_history() {
        let a = variable(1);
        let prev = previous(&a);

        a.set(2);
        assert_eq!(prev.value(), Err(CellError::Uninitialized));
        assert_eq!(previous(&a).key(), prev.key());
    }
}
