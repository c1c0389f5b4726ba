//! Store Cells
//!
//! A store cell caches the value of another cell. Unlike a plain compute
//! cell it is lazy: when its argument changes during a flush it only
//! becomes stale, and the value is recomputed on the next read.

use crate::graph::NodeKind;
use crate::key::Key;

use super::cell::Cell;
use super::compute::{ComputeCell, ComputeState, Tracking};
use super::state_manager::StateManager;

/// Cache the value of `cell`.
///
/// Every store of the same cell shares one state.
pub fn store<C: Cell>(cell: &C) -> ComputeCell<C::Value> {
    let key = Key::derived("store", &cell.key());
    let state = StateManager::get_or_create(&key, || {
        let cell = cell.clone();
        ComputeState::new(
            NodeKind::Derived,
            key.clone(),
            Tracking::Dynamic,
            Box::new(move || cell.value()),
        )
        .lazy()
        .register()
    });
    ComputeCell::from_state(state)
}
