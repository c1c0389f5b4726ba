//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cell states. It
//! owns the dependency graph, the observer lists and the batch counter,
//! and it runs flushes when sources change.
//!
//! # How It Works
//!
//! 1. When a cell state is created, it adds a node to the graph and
//!    registers itself with the runtime.
//!
//! 2. When a compute cell or watcher reads a cell, the argument tracker
//!    asks the runtime to record the dependency (or observer).
//!
//! 3. When a mutable cell's value changes, the runtime:
//!    a. Marks every state downstream of it as stale, right away
//!    b. Adds the cell to the pending set
//!    c. Flushes, unless a batch is open
//!
//! 4. A flush walks the affected states in topological order. Each state is
//!    visited once; it recomputes only if one of its dependencies reported
//!    a change. Observers hear `will_update` for everything up front and an
//!    `update` per cell as it resolves.
//!
//! # Threading
//!
//! All runtime state is thread-local. Each thread is an independent
//! reactive world; cell handles are not `Send`.
//!
//! No runtime borrow is held while a state or observer runs, so user code
//! may freely read and write cells from callbacks.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::config::RuntimeConfig;
use crate::error::CellError;
use crate::graph::{Node, NodeId, NodeKind, UpdateScheduler};
use crate::key::Key;

use super::state::CellState;
use super::subscriber::Observer;

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());

    // Nodes whose states were dropped while the runtime was borrowed.
    static DEFERRED: RefCell<Vec<NodeId>> = RefCell::new(Vec::new());
}

struct ObserverEntry {
    observer: Rc<dyn Observer>,
    count: usize,
}

type ObserverMap = IndexMap<usize, ObserverEntry>;

#[derive(Default)]
struct RuntimeState {
    scheduler: UpdateScheduler,

    /// Weak references so the registry never keeps a state alive.
    registry: HashMap<NodeId, Weak<dyn CellState>>,

    /// External observers per node, keyed by observer address.
    observers: HashMap<NodeId, ObserverMap>,

    batch_depth: usize,

    /// Sources changed since the last flush, in mutation order.
    pending: IndexSet<NodeId>,

    flushing: bool,

    config: RuntimeConfig,
}

impl RuntimeState {
    fn upgrade(&self, id: NodeId) -> Option<Rc<dyn CellState>> {
        self.registry.get(&id).and_then(Weak::upgrade)
    }

    fn remove(&mut self, id: NodeId) -> (SmallVec<[NodeId; 4]>, Option<ObserverMap>) {
        self.registry.remove(&id);
        self.pending.shift_remove(&id);
        let observers = self.observers.remove(&id);
        (self.scheduler.remove_node(id), observers)
    }

    fn take_pass(&mut self) -> Option<FlushPass> {
        if self.pending.is_empty() {
            return None;
        }

        let sources = std::mem::take(&mut self.pending);
        let nodes = self
            .scheduler
            .affected(&sources)
            .into_iter()
            .filter_map(|id| {
                let state = self.upgrade(id)?;
                let observers = self
                    .observers
                    .get(&id)
                    .map(|entries| entries.values().map(|e| e.observer.clone()).collect())
                    .unwrap_or_default();
                Some(PassNode {
                    id,
                    key: state.key(),
                    state,
                    observers,
                })
            })
            .collect();

        Some(FlushPass { sources, nodes })
    }
}

fn with_runtime<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
    let result = RUNTIME.with(|rt| f(&mut rt.borrow_mut()));
    drain_deferred();
    result
}

fn drain_deferred() {
    let deferred = DEFERRED
        .try_with(|d| std::mem::take(&mut *d.borrow_mut()))
        .unwrap_or_default();
    for id in deferred {
        Runtime::unregister(id);
    }
}

fn observer_slot(observer: &Rc<dyn Observer>) -> usize {
    Rc::as_ptr(observer) as *const () as usize
}

/// A state visited by a flush pass, with the observers it had when the
/// pass started.
struct PassNode {
    id: NodeId,
    key: Key,
    state: Rc<dyn CellState>,
    observers: Vec<Rc<dyn Observer>>,
}

struct FlushPass {
    sources: IndexSet<NodeId>,
    nodes: Vec<PassNode>,
}

impl FlushPass {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn run(self) {
        for node in &self.nodes {
            for observer in &node.observers {
                observer.will_update(&node.key);
            }
        }

        let mut changed: HashSet<NodeId> = HashSet::new();

        for node in &self.nodes {
            let did_change = if self.sources.contains(&node.id) {
                node.state.settle();
                true
            } else if with_runtime(|rt| {
                rt.scheduler
                    .dependencies(node.id)
                    .any(|d| changed.contains(&d))
            }) {
                node.state.resolve()
            } else {
                node.state.settle();
                false
            };

            if did_change {
                changed.insert(node.id);
            }

            for observer in &node.observers {
                observer.update(&node.key, did_change);
            }
        }

        trace!(
            sources = self.sources.len(),
            visited = self.nodes.len(),
            changed = changed.len(),
            "flush pass"
        );
    }
}

/// Clears the flushing flag on exit, even when an observer panics.
struct FlushGuard;

impl FlushGuard {
    fn acquire() -> Option<Self> {
        with_runtime(|rt| {
            if rt.flushing {
                None
            } else {
                rt.flushing = true;
                Some(FlushGuard)
            }
        })
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| {
            if let Ok(mut rt) = rt.try_borrow_mut() {
                rt.flushing = false;
            }
        });
    }
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    pub(crate) fn add_node(kind: NodeKind) -> NodeId {
        with_runtime(|rt| rt.scheduler.add_node(Node::new(kind)))
    }

    /// Register a state so the runtime can reach it during flushes.
    pub fn register<S: CellState + 'static>(state: &Rc<S>) {
        let id = state.node_id();
        let strong: Rc<dyn CellState> = state.clone();
        let weak = Rc::downgrade(&strong);
        with_runtime(|rt| rt.registry.insert(id, weak));
        trace!(node = id.raw(), key = ?state.key(), "registered cell state");
    }

    /// Remove a node and everything attached to it.
    pub(crate) fn unregister(id: NodeId) {
        let removed = RUNTIME.try_with(|rt| match rt.try_borrow_mut() {
            Ok(mut rt) => Some(rt.remove(id)),
            Err(_) => None,
        });

        match removed {
            Ok(Some((released, observers))) => {
                drop(observers);
                trace!(node = id.raw(), "unregistered cell state");
                for dependency in released {
                    Self::release(dependency);
                }
                drain_deferred();
            }
            Ok(None) => {
                let _ = DEFERRED.try_with(|d| d.borrow_mut().push(id));
            }
            // The thread is shutting down.
            Err(_) => {}
        }
    }

    fn release(id: NodeId) {
        let state = with_runtime(|rt| {
            if rt.scheduler.is_active(id) {
                None
            } else {
                rt.upgrade(id)
            }
        });
        if let Some(state) = state {
            state.pause();
        }
    }

    /// Record that `dependent` reads from `dependency`.
    ///
    /// If this is the dependency's first dependent or observer, it is
    /// initialized.
    pub fn add_dependency(dependency: &Rc<dyn CellState>, dependent: NodeId) {
        let id = dependency.node_id();
        if with_runtime(|rt| rt.scheduler.add_edge(id, dependent)) {
            dependency.init();
        }
    }

    /// Remove the record that `dependent` reads from `dependency`.
    ///
    /// If that was the dependency's last dependent or observer, it is
    /// paused.
    pub fn remove_dependency(dependency: NodeId, dependent: NodeId) {
        let released = with_runtime(|rt| {
            if rt.scheduler.remove_edge(dependency, dependent) {
                rt.upgrade(dependency)
            } else {
                None
            }
        });
        if let Some(state) = released {
            state.pause();
        }
    }

    /// Register an observer on a state. Observers are counted: adding the
    /// same observer twice takes two removals to undo.
    pub fn add_observer(state: &Rc<dyn CellState>, observer: Rc<dyn Observer>) {
        let id = state.node_id();
        let slot = observer_slot(&observer);

        let activated = with_runtime(|rt| {
            if rt.scheduler.get_node(id).is_none() {
                return false;
            }
            rt.observers
                .entry(id)
                .or_default()
                .entry(slot)
                .or_insert_with(|| ObserverEntry { observer, count: 0 })
                .count += 1;
            rt.scheduler.attach_observer(id)
        });

        if activated {
            state.init();
        }
    }

    pub fn remove_observer(state: &Rc<dyn CellState>, observer: &Rc<dyn Observer>) {
        let id = state.node_id();
        let slot = observer_slot(observer);

        let (removed, deactivated) = with_runtime(|rt| {
            let removed = {
                let Some(entries) = rt.observers.get_mut(&id) else {
                    return (None, false);
                };
                let Some(entry) = entries.get_mut(&slot) else {
                    return (None, false);
                };
                entry.count -= 1;
                let removed = if entry.count == 0 {
                    entries.shift_remove(&slot)
                } else {
                    None
                };
                if entries.is_empty() {
                    rt.observers.remove(&id);
                }
                removed
            };
            (removed, rt.scheduler.detach_observer(id))
        });

        drop(removed);
        if deactivated {
            state.pause();
        }
    }

    /// Whether the node has any observer or dependent.
    pub fn is_active(id: NodeId) -> bool {
        with_runtime(|rt| rt.scheduler.is_active(id))
    }

    /// Number of external observer registrations on a node.
    pub fn observer_count(id: NodeId) -> usize {
        with_runtime(|rt| rt.scheduler.get_node(id).map_or(0, Node::observer_count))
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        with_runtime(|rt| rt.scheduler.node_count())
    }

    /// A source changed. Everything downstream is marked stale now; the
    /// flush happens now or when the outermost batch ends.
    pub fn source_changed(id: NodeId) {
        let (stale, flush) = with_runtime(|rt| {
            rt.pending.insert(id);
            let stale: Vec<Rc<dyn CellState>> = rt
                .scheduler
                .descendants(id)
                .into_iter()
                .filter(|d| !rt.pending.contains(d))
                .filter_map(|d| rt.upgrade(d))
                .collect();
            (stale, rt.batch_depth == 0 && !rt.flushing)
        });

        for state in &stale {
            state.mark_stale();
        }
        drop(stale);

        if flush {
            Self::flush();
        }
    }

    /// Open a batch. Notifications are deferred until the matching
    /// [`end_batch`](Runtime::end_batch) of the outermost batch.
    pub fn begin_batch() {
        with_runtime(|rt| rt.batch_depth += 1);
    }

    /// Close a batch, flushing if it was the outermost one.
    pub fn end_batch() -> Result<(), CellError> {
        let flush = with_runtime(|rt| {
            if rt.batch_depth == 0 {
                return Err(CellError::UnbalancedBatch);
            }
            rt.batch_depth -= 1;
            Ok(rt.batch_depth == 0 && !rt.flushing)
        })?;

        if flush {
            Self::flush();
        }
        Ok(())
    }

    pub fn is_batching() -> bool {
        with_runtime(|rt| rt.batch_depth > 0)
    }

    /// Install a configuration for this thread.
    pub fn configure(config: RuntimeConfig) {
        debug!(?config, "runtime configured");
        with_runtime(|rt| rt.config = config);
    }

    /// The configuration in effect on this thread.
    pub fn config() -> RuntimeConfig {
        with_runtime(|rt| rt.config.clone())
    }

    fn flush() {
        let Some(_guard) = FlushGuard::acquire() else {
            return;
        };
        let max_passes = with_runtime(|rt| rt.config.max_flush_passes);

        let mut passes = 0;
        while let Some(pass) = with_runtime(RuntimeState::take_pass) {
            if passes == max_passes {
                let dropped = with_runtime(|rt| {
                    let count = rt.pending.len();
                    rt.pending.clear();
                    count
                });
                error!(
                    passes,
                    dropped = dropped + pass.len(),
                    "updates did not settle, dropping pending changes"
                );
                break;
            }
            passes += 1;
            pass.run();
        }

        debug!(passes, "flush complete");
    }
}
