//! Relationship types maintained by the time tree.

use serde::{Deserialize, Serialize};

/// Type of a directed edge written by the tree.
///
/// `Child` is an unordered bag per parent. `First`, `Last` and `Next` are
/// each zero-or-one per source node and together form the ascending sibling
/// chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelType {
    /// Parent to every child.
    Child,
    /// Parent to its smallest child.
    First,
    /// Parent to its largest child.
    Last,
    /// Child to the next larger sibling.
    Next,
}

impl RelType {
    /// Parse relationship type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CHILD" => Some(Self::Child),
            "FIRST" => Some(Self::First),
            "LAST" => Some(Self::Last),
            "NEXT" => Some(Self::Next),
            _ => None,
        }
    }

    /// Stored name of the relationship.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Child => "CHILD",
            Self::First => "FIRST",
            Self::Last => "LAST",
            Self::Next => "NEXT",
        }
    }

    /// Whether a source node may carry at most one edge of this type.
    pub fn is_single(&self) -> bool {
        !matches!(self, Self::Child)
    }
}

impl std::fmt::Display for RelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
