//! Graph storage backends.
//!
//! The tree only needs a small capability set from its store: labelled nodes,
//! scalar properties, directed typed edges and transactions. Every tree
//! operation opens one transaction with [`GraphStore::begin`], issues its reads
//! and writes through [`GraphTransaction`] and commits at the end. Dropping a
//! transaction without committing rolls it back.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{NodeId, RelType};

/// Trait for graph storage backends.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Transaction handle produced by [`GraphStore::begin`].
    type Transaction: GraphTransaction<Error = Self::Error>;

    /// Open a transaction.
    ///
    /// Concurrent transactions must be isolated: a reader never observes
    /// another transaction's uncommitted writes, and conflicting writers do not
    /// both commit.
    async fn begin(&self) -> Result<Self::Transaction, Self::Error>;

    /// Check if the store is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Reads and writes inside one transaction.
///
/// Writes are visible to later reads of the same transaction.
#[async_trait]
pub trait GraphTransaction: Send {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create a node carrying the given labels.
    async fn create_node(&mut self, labels: &[&str]) -> Result<NodeId, Self::Error>;

    /// Whether a node exists.
    async fn node_exists(&mut self, node: NodeId) -> Result<bool, Self::Error>;

    /// Labels of a node (empty if the node does not exist).
    async fn labels(&mut self, node: NodeId) -> Result<Vec<String>, Self::Error>;

    /// Nodes carrying a label, ordered by id.
    async fn nodes_with_label(&mut self, label: &str) -> Result<Vec<NodeId>, Self::Error>;

    /// Fetch the unique node with `label`, creating it on first use.
    ///
    /// Must be atomic against concurrent first use.
    async fn get_or_create_singleton(&mut self, label: &str) -> Result<NodeId, Self::Error>;

    /// Set a scalar property.
    async fn set_property(&mut self, node: NodeId, key: &str, value: Value) -> Result<(), Self::Error>;

    /// Read a scalar property.
    async fn get_property(&mut self, node: NodeId, key: &str) -> Result<Option<Value>, Self::Error>;

    /// Add an edge `from -[rel]-> to`.
    async fn create_edge(&mut self, from: NodeId, to: NodeId, rel: RelType) -> Result<(), Self::Error>;

    /// Point the single `rel` edge of `from` at `to`, removing any previous
    /// edges of that type.
    async fn replace_edge(&mut self, from: NodeId, rel: RelType, to: NodeId) -> Result<(), Self::Error>;

    /// Remove the edge `from -[rel]-> to` if present.
    async fn delete_edge(&mut self, from: NodeId, rel: RelType, to: NodeId) -> Result<(), Self::Error>;

    /// Targets of outgoing `rel` edges, ordered by id.
    async fn outgoing(&mut self, node: NodeId, rel: RelType) -> Result<Vec<NodeId>, Self::Error>;

    /// Sources of incoming `rel` edges, ordered by id.
    async fn incoming(&mut self, node: NodeId, rel: RelType) -> Result<Vec<NodeId>, Self::Error>;

    /// Make all writes durable and visible.
    async fn commit(self) -> Result<(), Self::Error>;

    /// Discard all writes.
    async fn rollback(self) -> Result<(), Self::Error>;
}

pub use memory::{InMemoryError, InMemoryGraphStore, InMemoryTransaction, StoreStats};

#[cfg(feature = "postgres")]
pub use postgres::{PoolStats, PostgresConfig, PostgresError, PostgresGraphStore, PostgresTransaction};
