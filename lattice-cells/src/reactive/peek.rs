//! Peeking
//!
//! Reading a cell through [`peek`] gives its current value without making
//! the reader depend on it. The peek cell does keep the peeked cell
//! active, so its value stays cached between reads.

use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::Maybe;
use crate::graph::NodeKind;
use crate::key::Key;

use super::cell::Cell;
use super::context::ArgumentTracker;
use super::runtime::Runtime;
use super::state::{CellState, NodeHandle};
use super::state_manager::StateManager;

struct PeekState<C> {
    handle: NodeHandle,
    cell: C,
}

impl<C: Cell> CellState for PeekState<C> {
    fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    fn init(&self) {
        for state in self.cell.states() {
            Runtime::add_dependency(&state, self.node_id());
        }
    }

    fn pause(&self) {
        for state in self.cell.states() {
            Runtime::remove_dependency(state.node_id(), self.node_id());
        }
    }

    // Changes stop here.
    fn resolve(&self) -> bool {
        false
    }
}

/// A cell with the value of another cell that never reports a change.
pub struct PeekCell<C> {
    state: Rc<PeekState<C>>,
}

impl<C: Cell> Cell for PeekCell<C> {
    type Value = C::Value;

    fn key(&self) -> Key {
        self.state.key()
    }

    fn state(&self) -> Option<Rc<dyn CellState>> {
        Some(self.state.clone())
    }

    fn value_untracked(&self) -> Maybe<C::Value> {
        self.state.cell.value_untracked()
    }
}

impl<C> Clone for PeekCell<C> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<C: Cell> Debug for PeekCell<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeekCell")
            .field("key", &self.state.key())
            .finish()
    }
}

/// Read `cell` without depending on it.
pub fn peek<C: Cell>(cell: &C) -> PeekCell<C> {
    let key = Key::derived("peek", &cell.key());
    let state = StateManager::get_or_create(&key, || {
        let state = Rc::new(PeekState {
            handle: NodeHandle::new(NodeKind::Derived, key.clone()),
            cell: cell.clone(),
        });
        Runtime::register(&state);
        state
    });
    PeekCell { state }
}

/// Run `f` without recording any cell it reads as an argument.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    ArgumentTracker::untracked(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::compute::computed;
    use crate::reactive::mutable::variable;
    use crate::reactive::subscriber::Subscriber;

    #[test]
    fn peek_reads_the_current_value() {
        let a = variable(1);
        let peeked = peek(&a);

        assert_eq!(peeked.value(), Ok(1));
        a.set(2);
        assert_eq!(peeked.value(), Ok(2));
        assert_eq!(peek(&a).key(), peeked.key());
    }

    #[test]
    fn peeked_changes_do_not_recompute_readers() {
        let a = variable(1);
        let b = variable(10);
        let sum = computed({
            let (a, b) = (peek(&a), b.clone());
            move || Ok(a.value()? + b.value()?)
        });
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        sum.add_observer(subscriber.clone());

        a.set(2);
        assert_eq!(subscriber.notifications(), 0);
        assert_eq!(sum.value(), Ok(11));

        b.set(20);
        assert_eq!(subscriber.notifications(), 1);
        assert_eq!(sum.value(), Ok(22));
    }

    #[test]
    fn peek_keeps_the_peeked_cell_active() {
        let a = variable(1);
        let peeked = peek(&a);
        let subscriber = Rc::new(Subscriber::new(|_| {}));
        peeked.add_observer(subscriber.clone());

        assert!(Runtime::is_active(a.state().unwrap().node_id()));
    }

    #[test]
    fn untracked_reads_are_not_arguments() {
        let a = variable(1);
        let (value, keys) = ArgumentTracker::collect(|| untracked(|| a.value()));

        assert_eq!(value, Ok(1));
        assert!(keys.is_empty());
    }
}
