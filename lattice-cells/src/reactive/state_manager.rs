//! State Manager
//!
//! Maps keys to the live state of keyed cells, so that every handle built
//! with the same key shares one state. The table holds weak references
//! only: once the last handle to a state is dropped, the state dies and
//! the next request for its key builds a fresh one.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::key::Key;

thread_local! {
    static STATES: RefCell<HashMap<Key, Weak<dyn Any>>> = RefCell::new(HashMap::new());
}

/// The table of keyed cell states on this thread.
pub struct StateManager;

impl StateManager {
    /// Return the live state for `key`, or build one with `create`.
    ///
    /// Unique keys never share, so they always build a fresh state. A live
    /// state of a different type under the same key is replaced.
    pub fn get_or_create<S, F>(key: &Key, create: F) -> Rc<S>
    where
        S: Any,
        F: FnOnce() -> Rc<S>,
    {
        if key.is_unique() {
            return create();
        }

        let existing = STATES.with(|states| states.borrow().get(key).and_then(Weak::upgrade));
        if let Some(existing) = existing {
            match existing.downcast::<S>() {
                Ok(state) => return state,
                Err(_) => warn!(
                    ?key,
                    expected = type_name::<S>(),
                    "key reused for a different cell type"
                ),
            }
        }

        // Built outside the borrow: creating a state may create keyed states too.
        let state = create();
        let shared: Rc<dyn Any> = state.clone();
        let weak = Rc::downgrade(&shared);
        STATES.with(|states| states.borrow_mut().insert(key.clone(), weak));
        state
    }

    /// Forget `key` if its state is no longer alive.
    pub fn release(key: &Key) {
        if key.is_unique() {
            return;
        }
        let _ = STATES.try_with(|states| {
            if let Ok(mut states) = states.try_borrow_mut() {
                if states.get(key).map_or(false, |weak| weak.strong_count() == 0) {
                    states.remove(key);
                }
            }
        });
    }

    /// Whether a live state is registered under `key`.
    pub fn contains(key: &Key) -> bool {
        STATES.with(|states| {
            states
                .borrow()
                .get(key)
                .map_or(false, |weak| weak.strong_count() > 0)
        })
    }

    /// Number of registered keys, live or not yet released.
    pub fn len() -> usize {
        STATES.with(|states| states.borrow().len())
    }
}
