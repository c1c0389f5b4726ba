//! Cell Keys
//!
//! A key identifies a cell's state. Two cell handles with equal keys share
//! one state through the state manager, so a derived cell created twice
//! from the same inputs is only computed once.
//!
//! Keys are either unique (equal only to themselves) or built from any
//! hashable value. Values of different types never compare equal, even if
//! their contents look the same.

use std::any::Any;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-erased key content.
///
/// Implemented for every `Hash + Eq + Debug + 'static` type.
pub trait KeyValue: Any + Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn KeyValue) -> bool;
    fn hash_key(&self, state: &mut dyn Hasher);
}

impl<T> KeyValue for T
where
    T: Hash + Eq + Debug + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_key(&self, other: &dyn KeyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }
}

#[derive(Clone)]
enum Repr {
    Unique(u64),
    Value(Rc<dyn KeyValue>),
}

/// Identity of a cell state.
///
/// Cloning a key is cheap.
#[derive(Clone)]
pub struct Key(Repr);

impl Key {
    /// A fresh key equal only to itself and its clones.
    pub fn unique() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Key(Repr::Unique(COUNTER.fetch_add(1, Ordering::Relaxed)))
    }

    /// A key built from a value. Equal values of the same type give equal
    /// keys.
    pub fn value<V>(value: V) -> Self
    where
        V: Hash + Eq + Debug + 'static,
    {
        Key(Repr::Value(Rc::new(value)))
    }

    /// The key of a cell derived from another cell by the operation `tag`.
    pub fn derived(tag: &'static str, key: &Key) -> Self {
        Key::value((tag, key.clone()))
    }

    /// Whether this key was created by [`Key::unique`].
    pub fn is_unique(&self) -> bool {
        matches!(self.0, Repr::Unique(_))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Unique(a), Repr::Unique(b)) => a == b,
            (Repr::Value(a), Repr::Value(b)) => a.eq_key(&**b),
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Repr::Unique(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            Repr::Value(value) => {
                1u8.hash(state);
                value.as_any().type_id().hash(state);
                value.hash_key(state);
            }
        }
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Unique(id) => write!(f, "#{id}"),
            Repr::Value(value) => Debug::fmt(value, f),
        }
    }
}
