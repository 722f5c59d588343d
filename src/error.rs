//! Error type for time tree operations.

use crate::types::NodeId;

/// Error type for time tree operations.
///
/// Input errors (`InvalidTimestamp`, `InvalidTimeZone`, `InvalidRange`,
/// `MissingRoot`) are returned to the caller unchanged. `CorruptTree` is
/// fatal and never repaired. Store conflicts arrive as `Store` and are left
/// to the caller's retry policy; every mutating operation is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeTreeError {
    /// Instant cannot be represented as a calendar date.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
    /// Time zone identifier is not a known IANA zone.
    #[error("Invalid time zone: {0}")]
    InvalidTimeZone(String),
    /// Range end lies before its start.
    #[error("Invalid range: end {end} is before start {start}")]
    InvalidRange {
        /// Range start in epoch milliseconds.
        start: i64,
        /// Range end in epoch milliseconds.
        end: i64,
    },
    /// Custom root does not exist in the store.
    #[error("Root node not found: {0}")]
    MissingRoot(NodeId),
    /// A child with this value already exists under the parent.
    #[error("Node {parent} already has a child with value {value}")]
    DuplicateChild {
        /// Parent node.
        parent: NodeId,
        /// Conflicting unit value.
        value: i32,
    },
    /// Labels or linkage contradict the tree invariants.
    #[error("Corrupt time tree at node {node}: {reason}")]
    CorruptTree {
        /// Node where the inconsistency was detected.
        node: NodeId,
        /// What was wrong.
        reason: String,
    },
    /// Graph store error.
    #[error("Store error: {0}")]
    Store(String),
}

impl TimeTreeError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    /// Create a corruption error.
    pub fn corrupt(node: NodeId, reason: impl Into<String>) -> Self {
        tracing::warn!(node = %node, "time tree corruption detected");
        Self::CorruptTree {
            node,
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimestamp(_)
                | Self::InvalidTimeZone(_)
                | Self::InvalidRange { .. }
                | Self::MissingRoot(_)
        )
    }
}
