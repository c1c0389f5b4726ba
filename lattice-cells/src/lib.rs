//! Lattice Cells
//!
//! This crate provides a reactive cell engine: values that change over time
//! and computations that stay consistent with them. It implements:
//!
//! - Mutable cells and compute cells with automatic argument tracking
//! - Glitch-free, batched change propagation
//! - Keyed cells that share one state between equal keys
//! - Two-way cells that write back through a reverse function
//! - Watchers for side effects
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: cells, argument tracking, the runtime and watchers
//! - `graph`: the dependency graph and its update ordering
//! - `combinators`: error recovery and selection built from cells
//! - `error`, `key`, `config`: shared types
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_cells::{computed, variable, watch, Cell};
//!
//! // Create a mutable cell
//! let count = variable(0);
//!
//! // Create a derived value
//! let doubled = computed({
//!     let count = count.clone();
//!     move || Ok(count.value()? * 2)
//! });
//!
//! // Watch it
//! let _watcher = watch(move || {
//!     println!("Doubled: {}", doubled.value()?);
//!     Ok(())
//! });
//!
//! // Update the cell
//! count.set(5);
//! // The watcher runs again, prints: "Doubled: 10"
//! ```

pub mod combinators;
pub mod config;
pub mod error;
pub mod graph;
pub mod key;
pub mod reactive;

pub use combinators::{maybe_cell, maybe_mutable, on_error, on_error_if, select, select_if};
pub use config::RuntimeConfig;
pub use error::{none, CellError, ComputeFailure, Maybe};
pub use key::{Key, KeyValue};
pub use reactive::{
    batch, begin_batch, cell_view, cell_view_keyed, computed, computed_static, computed_static_with,
    computed_with, constant, end_batch, mutable_computed, mutable_computed_keyed,
    mutable_computed_static, mutable_computed_static_keyed, peek, previous, store, untracked,
    value_cell, variable, variable_keyed, watch, AnyCell, ArgumentTracker, BatchUpdate, Cell,
    CellValue, CellView, ComputeCell, ComputeOptions, ConstantCell, MutableCell,
    MutableComputeCell, PeekCell, PreviousCell, Watcher,
};
