//! Cell States
//!
//! Every cell handle is a thin reference to a shared state. The state holds
//! the value and takes part in propagation through the [`CellState`]
//! capability interface, which is all the runtime knows about it.

use crate::graph::{NodeId, NodeKind};
use crate::key::Key;

use super::runtime::Runtime;
use super::state_manager::StateManager;

/// Where a derived cell's cached value stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The cached value is up to date.
    Clean,

    /// A dependency may have changed. The next read recomputes.
    Stale,

    /// The compute function is running.
    Computing,
}

/// The runtime's view of a cell state.
///
/// Lifecycle: a state is *inactive* until something observes it. The first
/// observer or dependent calls [`init`](CellState::init), which lets the
/// state subscribe to its own inputs. Losing the last one calls
/// [`pause`](CellState::pause), which releases them.
///
/// During a flush every affected state is visited once, in dependency
/// order, and either [`resolve`](CellState::resolve)d (an input changed) or
/// [`settle`](CellState::settle)d (nothing it reads changed).
pub trait CellState {
    /// The graph registration of this state.
    fn handle(&self) -> &NodeHandle;

    fn node_id(&self) -> NodeId {
        self.handle().id()
    }

    fn key(&self) -> Key {
        self.handle().key().clone()
    }

    /// Called when the state gains its first observer or dependent.
    fn init(&self) {}

    /// Called when the state loses its last observer or dependent.
    fn pause(&self) {}

    /// An upstream source changed; the cached value can no longer be trusted.
    fn mark_stale(&self) {}

    /// Bring the value up to date after an input changed. Returns whether
    /// the value changed.
    fn resolve(&self) -> bool {
        true
    }

    /// No input changed during this flush; the cached value stands.
    fn settle(&self) {}

    fn phase(&self) -> Phase {
        Phase::Clean
    }
}

/// Registration of a state in the runtime graph.
///
/// Dropping the handle removes the node, its edges and its observers, and
/// forgets the state's key in the state manager.
#[derive(Debug)]
pub struct NodeHandle {
    id: NodeId,
    key: Key,
}

impl NodeHandle {
    pub fn new(kind: NodeKind, key: Key) -> Self {
        Self {
            id: Runtime::add_node(kind),
            key,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.id);
        StateManager::release(&self.key);
    }
}
