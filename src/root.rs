//! Root selection.
//!
//! One engine serves both modes; only the way the anchor node is obtained
//! differs.

use serde::{Deserialize, Serialize};

use crate::error::TimeTreeError;
use crate::store::GraphTransaction;
use crate::types::{NodeId, TIME_TREE_ROOT_LABEL};

/// Anchor of one independent time tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Root {
    /// The store-wide node labelled `TimeTreeRoot`, created on first use.
    Singleton,
    /// Any existing node, regardless of its labels.
    Explicit(NodeId),
}

impl Root {
    /// Resolve the root node, creating the singleton if needed.
    pub async fn get_or_create<T: GraphTransaction>(&self, tx: &mut T) -> Result<NodeId, TimeTreeError> {
        match *self {
            Self::Singleton => tx
                .get_or_create_singleton(TIME_TREE_ROOT_LABEL)
                .await
                .map_err(TimeTreeError::from_store),
            Self::Explicit(id) => require(tx, id).await.map(|_| id),
        }
    }

    /// Resolve the root node without creating anything.
    ///
    /// Returns `None` when the singleton root has not been created yet.
    pub async fn find<T: GraphTransaction>(&self, tx: &mut T) -> Result<Option<NodeId>, TimeTreeError> {
        match *self {
            Self::Singleton => {
                let roots = tx
                    .nodes_with_label(TIME_TREE_ROOT_LABEL)
                    .await
                    .map_err(TimeTreeError::from_store)?;
                match roots.as_slice() {
                    [] => Ok(None),
                    [root] => Ok(Some(*root)),
                    [first, ..] => Err(TimeTreeError::corrupt(*first, "more than one TimeTreeRoot")),
                }
            }
            Self::Explicit(id) => require(tx, id).await.map(|_| Some(id)),
        }
    }
}

impl Default for Root {
    fn default() -> Self {
        Self::Singleton
    }
}

impl std::fmt::Display for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Singleton => write!(f, "{}", TIME_TREE_ROOT_LABEL),
            Self::Explicit(id) => write!(f, "node {}", id),
        }
    }
}

async fn require<T: GraphTransaction>(tx: &mut T, id: NodeId) -> Result<(), TimeTreeError> {
    if tx.node_exists(id).await.map_err(TimeTreeError::from_store)? {
        Ok(())
    } else {
        Err(TimeTreeError::MissingRoot(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GraphStore, InMemoryGraphStore};

    #[tokio::test]
    async fn test_singleton_created_once() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();

        assert_eq!(Root::Singleton.find(&mut tx).await.unwrap(), None);
        let root = Root::Singleton.get_or_create(&mut tx).await.unwrap();
        assert_eq!(Root::Singleton.get_or_create(&mut tx).await.unwrap(), root);
        assert_eq!(Root::Singleton.find(&mut tx).await.unwrap(), Some(root));
    }

    #[tokio::test]
    async fn test_explicit_root_must_exist() {
        let store = InMemoryGraphStore::new();
        let custom = store.create_node(&["CustomRoot"]).await.unwrap();
        let mut tx = store.begin().await.unwrap();

        assert_eq!(Root::Explicit(custom).get_or_create(&mut tx).await.unwrap(), custom);
        assert_eq!(Root::Explicit(custom).find(&mut tx).await.unwrap(), Some(custom));
        let missing = NodeId::new(404);
        assert_eq!(
            Root::Explicit(missing).find(&mut tx).await.unwrap_err(),
            TimeTreeError::MissingRoot(missing)
        );
    }
}
