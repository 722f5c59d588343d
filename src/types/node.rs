//! Node identifiers and tree nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::resolution::Resolution;

/// Property key holding a tree node's unit value.
pub const VALUE_PROPERTY: &str = "value";

/// Identifier of a node in the graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a NodeId from its raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A node of the time tree: a store node plus its level and unit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeNode {
    /// Store identity.
    pub id: NodeId,
    /// Calendar level (the node's label).
    pub resolution: Resolution,
    /// Unit value at that level, e.g. 5 for May.
    pub value: i32,
}

impl TreeNode {
    /// Create a tree node handle.
    pub fn new(id: NodeId, resolution: Resolution, value: i32) -> Self {
        Self { id, resolution, value }
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})#{}", self.resolution, self.value, self.id)
    }
}
