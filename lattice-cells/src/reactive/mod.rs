//! Reactive Cells
//!
//! This module implements the cell engine: mutable cells, compute cells
//! derived from them, and watchers that run side effects when they change.
//!
//! # Concepts
//!
//! ## Mutable cells
//!
//! A [`MutableCell`] holds a value set from outside. Setting it to a
//! different value notifies everything that reads it.
//!
//! ## Compute cells
//!
//! A [`ComputeCell`] derives its value from other cells. Its arguments are
//! found by watching what its function reads, or given up front for static
//! cells. While something observes it the value is cached and kept up to
//! date; otherwise it is recomputed on each read.
//!
//! A [`MutableComputeCell`] is a compute cell that can also be set, writing
//! back to its arguments through a reverse function. A [`CellView`] does
//! the same without a cache.
//!
//! ## Watchers
//!
//! A [`Watcher`] runs a callback whenever the cells it read last time
//! change.
//!
//! # Propagation
//!
//! Changes are propagated in batches. Within a [`batch`] every read sees the
//! latest values; once the outermost batch ends, each affected cell is
//! brought up to date exactly once, in dependency order, and observers are
//! told which cells actually changed.
//!
//! # Identity
//!
//! Every cell has a [`Key`](crate::Key). Cells created with equal keys share
//! one state for as long as any handle to it is alive, see
//! [`StateManager`].

mod batch;
mod cell;
mod compute;
mod context;
mod mutable;
mod mutable_compute;
mod peek;
mod previous;
mod runtime;
mod state;
mod state_manager;
mod store;
mod subscriber;
mod view;
mod watcher;

pub use batch::{batch, begin_batch, end_batch, BatchUpdate};
pub use cell::{constant, value_cell, AnyCell, Cell, CellValue, ConstantCell};
pub use compute::{
    computed, computed_static, computed_static_with, computed_with, ComputeCell, ComputeOptions,
};
pub use context::ArgumentTracker;
pub use mutable::{variable, variable_keyed, MutableCell};
pub use mutable_compute::{
    mutable_computed, mutable_computed_keyed, mutable_computed_static,
    mutable_computed_static_keyed, MutableComputeCell,
};
pub use peek::{peek, untracked, PeekCell};
pub use previous::{previous, PreviousCell};
pub use runtime::Runtime;
pub use state::{CellState, NodeHandle, Phase};
pub use state_manager::StateManager;
pub use store::store;
pub use subscriber::{Observer, Subscriber};
pub use view::{cell_view, cell_view_keyed, CellView};
pub use watcher::{watch, Watcher};

pub(crate) use compute::{ComputeState, Tracking};
