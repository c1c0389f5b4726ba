//! Update Scheduler
//!
//! The scheduler owns the dependency graph and decides the order in which
//! affected nodes are brought up to date. Dependencies always come before
//! their dependents.
//!
//! # Algorithm
//!
//! 1. Starting from the changed sources, walk dependent edges breadth-first
//!    to collect every affected node.
//! 2. Sort the affected nodes topologically with Kahn's algorithm, counting
//!    only edges inside the affected set.
//! 3. Ties are broken by discovery order, so sources changed first are
//!    processed first.
//!
//! The graph also tracks activity. A node with no observers and no
//! dependents is inactive; callers are told whenever an edge or observer
//! change flips a node between the two states, so they can subscribe or
//! release the node's own inputs.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::warn;

use super::node::{Node, NodeId};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node and every edge touching it.
    ///
    /// Returns the dependencies that lost their last dependent and are now
    /// inactive.
    pub fn remove_node(&mut self, node_id: NodeId) -> SmallVec<[NodeId; 4]> {
        let mut released = SmallVec::new();

        let Some(node) = self.nodes.remove(&node_id) else {
            return released;
        };

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
                if !dep.is_active() {
                    released.push(*dep_id);
                }
            }
        }

        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        released
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Add a dependency edge: `dependent` reads from `dependency`.
    ///
    /// Returns `true` if this edge activated `dependency`.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) -> bool {
        if dependency == dependent
            || !self.nodes.contains_key(&dependency)
            || !self.nodes.contains_key(&dependent)
        {
            return false;
        }

        let Some(dep_node) = self.nodes.get_mut(&dependency) else {
            return false;
        };
        let was_active = dep_node.is_active();
        if !dep_node.add_dependent(dependent) {
            return false;
        }

        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }

        !was_active
    }

    /// Remove a dependency edge.
    ///
    /// Returns `true` if this edge was the last thing keeping `dependency`
    /// active.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) -> bool {
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }

        match self.nodes.get_mut(&dependency) {
            Some(dep_node) => dep_node.remove_dependent(dependent) && !dep_node.is_active(),
            None => false,
        }
    }

    /// Count an external observer. Returns `true` if the node was activated.
    pub fn attach_observer(&mut self, node_id: NodeId) -> bool {
        match self.nodes.get_mut(&node_id) {
            Some(node) => {
                let was_active = node.is_active();
                node.attach_observer();
                !was_active
            }
            None => false,
        }
    }

    /// Release an external observer. Returns `true` if the node is now
    /// inactive.
    pub fn detach_observer(&mut self, node_id: NodeId) -> bool {
        match self.nodes.get_mut(&node_id) {
            Some(node) if node.observer_count() > 0 => {
                node.detach_observer();
                !node.is_active()
            }
            _ => false,
        }
    }

    /// Whether the node exists and has an observer or dependent.
    pub fn is_active(&self, node_id: NodeId) -> bool {
        self.nodes.get(&node_id).map_or(false, Node::is_active)
    }

    /// The direct dependencies of a node.
    pub fn dependencies(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(&node_id)
            .into_iter()
            .flat_map(|node| node.dependencies().iter().copied())
    }

    /// Every node reachable from `node_id` through dependent edges, in
    /// breadth-first order. The node itself is not included.
    pub fn descendants(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut visited = IndexSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(node_id);

        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&current) {
                for &dependent in node.dependents() {
                    if dependent != node_id && visited.insert(dependent) {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        visited.into_iter().collect()
    }

    /// The changed sources plus everything downstream of them, sorted so
    /// that each node comes after all of its affected dependencies.
    pub fn affected(&self, sources: &IndexSet<NodeId>) -> Vec<NodeId> {
        let mut set: IndexSet<NodeId> = sources
            .iter()
            .copied()
            .filter(|id| self.nodes.contains_key(id))
            .collect();

        let mut queue: VecDeque<NodeId> = set.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&current) {
                for &dependent in node.dependents() {
                    if set.insert(dependent) {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        self.topological_sort(&set)
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Nodes caught in a cycle cannot be ordered; they are appended at the
    /// end in discovery order.
    fn topological_sort(&self, nodes: &IndexSet<NodeId>) -> Vec<NodeId> {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::with_capacity(nodes.len());
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &node_id in nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| nodes.contains(*d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*dependent_id);
                        }
                    }
                }
            }
        }

        if result.len() < in_degree.len() {
            let leftover: Vec<NodeId> = nodes
                .iter()
                .copied()
                .filter(|id| in_degree.get(id).map_or(false, |d| *d > 0))
                .collect();
            warn!(count = leftover.len(), "dependency cycle, ordering by discovery");
            result.extend(leftover);
        }

        result
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
