//! Dependency Graph
//!
//! This module implements the graph that records which cells read from
//! which other cells.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent cell states (mutable, computed or two-way)
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When a mutable cell changes, the runtime asks the scheduler for every
//! node downstream of it, in an order where each node comes after its
//! dependencies. Each node is then brought up to date exactly once.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized rather than spread over the cells, so that a
//!    whole batch of changes can be ordered at once.
//!
//! 2. The graph is indexed by node ID for O(1) lookups, and holds no
//!    references to cell states. States register themselves with the
//!    runtime and remove their node when dropped.
//!
//! 3. Both forward (dependencies) and reverse (dependents) edges are kept,
//!    and edge sets preserve insertion order so propagation is
//!    deterministic.

mod node;
mod scheduler;

pub use node::{Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
