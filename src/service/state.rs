//! Service state management.

use std::sync::Arc;

use crate::config::TimeTreeConfig;
use crate::store::GraphStore;
use crate::timetree::TimeTree;

/// Default cap on the units one range request may touch.
pub const DEFAULT_MAX_RANGE_UNITS: u64 = 100_000;

/// Shared service state.
///
/// Holds the tree engine; the engine owns the store and the defaults used for
/// requests that omit `resolution` or `timezone`.
pub struct ServiceState<S: GraphStore + 'static> {
    /// The tree engine.
    pub tree: Arc<TimeTree<S>>,
    /// Largest range, in units of its resolution, a request may ask for.
    pub max_range_units: u64,
}

impl<S: GraphStore + 'static> ServiceState<S> {
    /// Create service state over a store with the given defaults.
    pub fn new(store: S, config: TimeTreeConfig) -> Self {
        Self {
            tree: Arc::new(TimeTree::with_config(Arc::new(store), config)),
            max_range_units: DEFAULT_MAX_RANGE_UNITS,
        }
    }

    /// Override the range size cap.
    pub fn with_max_range_units(mut self, max_range_units: u64) -> Self {
        self.max_range_units = max_range_units;
        self
    }

    /// Create service state with defaults read from the environment.
    ///
    /// Reads `TIMETREE_RESOLUTION`, `TIMETREE_TIME_ZONE` and
    /// `TIMETREE_MAX_RANGE_UNITS`.
    pub fn from_env(store: S) -> Self {
        let max_range_units = match std::env::var("TIMETREE_MAX_RANGE_UNITS") {
            Ok(s) => s.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %s, "Ignoring invalid TIMETREE_MAX_RANGE_UNITS");
                DEFAULT_MAX_RANGE_UNITS
            }),
            Err(_) => DEFAULT_MAX_RANGE_UNITS,
        };
        Self::new(store, TimeTreeConfig::from_env()).with_max_range_units(max_range_units)
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        self.tree.store()
    }
}

impl<S: GraphStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            max_range_units: self.max_range_units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;
    use crate::types::Resolution;

    #[test]
    fn test_state_clone_shares_tree() {
        let state = ServiceState::new(
            InMemoryGraphStore::new(),
            TimeTreeConfig::new(Resolution::Hour, chrono_tz::UTC),
        )
        .with_max_range_units(24);
        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.tree, &cloned.tree));
        assert_eq!(cloned.tree.config().default_resolution, Resolution::Hour);
        assert_eq!(cloned.max_range_units, 24);
    }
}
