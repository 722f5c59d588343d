//! Core types for the time tree.

pub mod resolution;
pub mod relationship;
pub mod node;
pub mod instant;

pub use resolution::{Resolution, TIME_TREE_ROOT_LABEL};
pub use relationship::RelType;
pub use node::{NodeId, TreeNode, VALUE_PROPERTY};
pub use instant::{TimeInstant, TimeRange};
