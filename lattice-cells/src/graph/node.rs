//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A mutable cell. Changes enter the graph here.
    Source,

    /// A cell whose value is computed from other cells.
    Derived,

    /// A computed cell that can also be assigned. It acts as a source when
    /// set and as a derived cell otherwise.
    TwoWay,
}

/// A node in the dependency graph.
///
/// A node is *active* while anything observes it: either an external
/// observer or another node that depends on it.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Number of external observers (watchers and callbacks).
    observers: usize,

    /// Nodes that this node reads from.
    dependencies: IndexSet<NodeId>,

    /// Nodes that read from this node.
    dependents: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            observers: 0,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn source() -> Self {
        Self::new(NodeKind::Source)
    }

    pub fn derived() -> Self {
        Self::new(NodeKind::Derived)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Whether the node has any observer or dependent.
    pub fn is_active(&self) -> bool {
        self.observers > 0 || !self.dependents.is_empty()
    }

    pub fn observer_count(&self) -> usize {
        self.observers
    }

    pub(crate) fn attach_observer(&mut self) {
        self.observers += 1;
    }

    pub(crate) fn detach_observer(&mut self) {
        self.observers = self.observers.saturating_sub(1);
    }

    /// Add a dependency. Returns `false` if it was already present.
    pub fn add_dependency(&mut self, node_id: NodeId) -> bool {
        self.dependencies.insert(node_id)
    }

    pub fn remove_dependency(&mut self, node_id: NodeId) -> bool {
        self.dependencies.shift_remove(&node_id)
    }

    /// Nodes this node reads from, in the order they were first read.
    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    pub fn add_dependent(&mut self, node_id: NodeId) -> bool {
        self.dependents.insert(node_id)
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) -> bool {
        self.dependents.shift_remove(&node_id)
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }
}
