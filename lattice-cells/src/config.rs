//! Runtime Configuration
//!
//! Knobs that change how the per-thread runtime propagates updates. The
//! defaults match the behaviour most applications expect, so most code
//! never installs a configuration at all.

use serde::{Deserialize, Serialize};

/// Configuration of the reactive runtime on the current thread.
///
/// Install with [`Runtime::configure`](crate::reactive::Runtime::configure).
///
/// # Example
///
/// ```rust
/// use lattice_cells::RuntimeConfig;
///
/// let config = RuntimeConfig {
///     notify_on_equal_set: true,
///     ..Default::default()
/// };
/// assert_eq!(config.max_flush_passes, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Notify observers when a mutable cell is set to a value equal to the
    /// one it already holds.
    pub notify_on_equal_set: bool,

    /// Maximum number of propagation passes in one flush. Observers that
    /// keep mutating cells past this limit have their remaining updates
    /// dropped.
    pub max_flush_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            notify_on_equal_set: false,
            max_flush_passes: 64,
        }
    }
}
