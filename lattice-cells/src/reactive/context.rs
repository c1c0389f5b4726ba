//! Argument Tracking
//!
//! The argument tracker records which cells a computation reads. This is
//! what lets compute cells and watchers discover their dependencies
//! without declaring them.
//!
//! # Implementation
//!
//! We use a thread-local stack of tracking scopes. Entering a computation
//! (a compute cell recomputing, a watcher running) pushes a scope; every
//! cell read while it is innermost is recorded in it. Scopes nest, so a
//! compute cell that reads another compute cell only sees its direct
//! arguments.
//!
//! When the scope belongs to an active compute cell or a running watcher,
//! a newly seen argument is subscribed to immediately, before its value is
//! read. The argument therefore becomes active (and caches) before the
//! read that discovered it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::graph::NodeId;
use crate::key::Key;

use super::runtime::Runtime;
use super::state::CellState;
use super::subscriber::Observer;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// What happens to a cell read inside a scope.
pub(crate) enum TrackTarget {
    /// Record it and make it a graph dependency of this node.
    Node(NodeId),

    /// Record it and register this observer on it.
    Observer(Rc<dyn Observer>),

    /// Record it only.
    Detached,

    /// Ignore it.
    Untracked,
}

/// One tracking scope on the stack.
struct ContextEntry {
    scope: u64,

    /// The compute cell being evaluated, if the scope belongs to one.
    owner: Option<NodeId>,

    target: TrackTarget,

    /// Arguments that are already subscribed from a previous run.
    known: HashSet<NodeId>,

    /// Arguments read in this scope, in first-read order.
    tracked: IndexMap<NodeId, Rc<dyn CellState>>,
}

enum Subscribe {
    Node(NodeId),
    Observer(Rc<dyn Observer>),
}

/// Guard for a tracking scope. The scope is popped when the guard is
/// dropped, even if the computation panics.
pub struct ArgumentTracker {
    scope: u64,
    finished: bool,
}

impl ArgumentTracker {
    pub(crate) fn enter(
        target: TrackTarget,
        owner: Option<NodeId>,
        known: HashSet<NodeId>,
    ) -> Self {
        static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(0);
        let scope = SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed);

        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                scope,
                owner,
                target,
                known,
                tracked: IndexMap::new(),
            });
        });

        Self {
            scope,
            finished: false,
        }
    }

    /// Pop the scope and return the arguments read inside it.
    pub(crate) fn finish(mut self) -> IndexMap<NodeId, Rc<dyn CellState>> {
        self.finished = true;
        self.pop().map(|entry| entry.tracked).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right scope.
        if let Some(entry) = &popped {
            debug_assert_eq!(
                entry.scope, self.scope,
                "ArgumentTracker mismatch: expected scope {}, got {}",
                self.scope, entry.scope
            );
        }
        popped
    }

    /// Check if cell reads are currently being recorded.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map_or(false, |entry| !matches!(entry.target, TrackTarget::Untracked))
        })
    }

    /// The compute cell currently being evaluated on this thread, if any.
    pub fn computing() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack.borrow().iter().rev().find_map(|entry| entry.owner)
        })
    }

    /// Record a read of `state` in the innermost scope.
    ///
    /// This is called by cells when they are read.
    pub fn track(state: &Rc<dyn CellState>) {
        let id = state.node_id();

        let subscribe = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;

            if matches!(entry.target, TrackTarget::Untracked) || entry.tracked.contains_key(&id) {
                return None;
            }
            entry.tracked.insert(id, state.clone());

            if entry.known.contains(&id) {
                return None;
            }
            match &entry.target {
                TrackTarget::Node(owner) if *owner != id => Some(Subscribe::Node(*owner)),
                TrackTarget::Observer(observer) => Some(Subscribe::Observer(observer.clone())),
                _ => None,
            }
        });

        match subscribe {
            Some(Subscribe::Node(owner)) => Runtime::add_dependency(state, owner),
            Some(Subscribe::Observer(observer)) => Runtime::add_observer(state, observer),
            None => {}
        }
    }

    /// Run `f` without recording any of the cells it reads.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _scope = Self::enter(TrackTarget::Untracked, None, HashSet::new());
        f()
    }

    /// Run `f` and return the keys of the cells it read directly.
    pub fn collect<R>(f: impl FnOnce() -> R) -> (R, Vec<Key>) {
        let scope = Self::enter(TrackTarget::Detached, None, HashSet::new());
        let result = f();
        let keys = scope
            .finish()
            .values()
            .map(|state| state.key())
            .collect();
        (result, keys)
    }
}

impl Drop for ArgumentTracker {
    fn drop(&mut self) {
        if !self.finished {
            drop(self.pop());
        }
    }
}
