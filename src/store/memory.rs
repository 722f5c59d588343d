//! In-memory graph store.
//!
//! Transactions are serialized by an async mutex held for the transaction's
//! lifetime, so readers never observe partial writes. Writes are applied in
//! place and recorded in an undo log that is replayed on rollback or drop.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{GraphStore, GraphTransaction};
use crate::types::{NodeId, RelType};

/// Error type for in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryError {
    /// Node not found.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    /// Transaction already committed or rolled back.
    #[error("Transaction is closed")]
    TransactionClosed,
}

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    labels: BTreeSet<String>,
    properties: BTreeMap<String, Value>,
}

/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Default)]
struct GraphState {
    next_id: u64,
    nodes: BTreeMap<NodeId, NodeRecord>,
    by_label: BTreeMap<String, BTreeSet<NodeId>>,
    outgoing: BTreeMap<(NodeId, RelType), BTreeSet<NodeId>>,
    incoming: BTreeMap<(NodeId, RelType), BTreeSet<NodeId>>,
    committed_mutations: u64,
}

impl GraphState {
    fn require(&self, node: NodeId) -> Result<(), InMemoryError> {
        if self.nodes.contains_key(&node) {
            Ok(())
        } else {
            Err(InMemoryError::NodeNotFound(node))
        }
    }

    fn insert_edge(&mut self, from: NodeId, rel: RelType, to: NodeId) -> bool {
        let added = self.outgoing.entry((from, rel)).or_default().insert(to);
        self.incoming.entry((to, rel)).or_default().insert(from);
        added
    }

    fn remove_edge(&mut self, from: NodeId, rel: RelType, to: NodeId) -> bool {
        let removed = remove_from(&mut self.outgoing, (from, rel), to);
        remove_from(&mut self.incoming, (to, rel), from);
        removed
    }

    fn undo(&mut self, op: Undo) {
        match op {
            Undo::CreateNode(node) => {
                if let Some(record) = self.nodes.remove(&node) {
                    for label in record.labels {
                        remove_from(&mut self.by_label, label, node);
                    }
                }
            }
            Undo::SetProperty { node, key, previous } => {
                if let Some(record) = self.nodes.get_mut(&node) {
                    match previous {
                        Some(value) => record.properties.insert(key, value),
                        None => record.properties.remove(&key),
                    };
                }
            }
            Undo::CreateEdge { from, rel, to } => {
                self.remove_edge(from, rel, to);
            }
            Undo::DeleteEdge { from, rel, to } => {
                self.insert_edge(from, rel, to);
            }
        }
    }

    fn edge_count(&self) -> usize {
        self.outgoing.values().map(BTreeSet::len).sum()
    }
}

fn remove_from<K: Ord>(map: &mut BTreeMap<K, BTreeSet<NodeId>>, key: K, node: NodeId) -> bool {
    let Some(set) = map.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(&node);
    if set.is_empty() {
        map.remove(&key);
    }
    removed
}

#[derive(Debug)]
enum Undo {
    CreateNode(NodeId),
    SetProperty {
        node: NodeId,
        key: String,
        previous: Option<Value>,
    },
    CreateEdge {
        from: NodeId,
        rel: RelType,
        to: NodeId,
    },
    DeleteEdge {
        from: NodeId,
        rel: RelType,
        to: NodeId,
    },
}

/// Store size and write counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Number of nodes.
    pub nodes: usize,
    /// Number of edges.
    pub edges: usize,
    /// Writes made by committed transactions (no-op writes excluded).
    pub committed_mutations: u64,
}

/// In-memory graph store.
///
/// Cloning is cheap and yields a handle to the same graph.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    state: Arc<Mutex<GraphState>>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node in its own transaction (e.g. a custom root).
    pub async fn create_node(&self, labels: &[&str]) -> Result<NodeId, InMemoryError> {
        let mut tx = self.begin().await?;
        let id = tx.create_node(labels).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Get store statistics.
    pub async fn stats(&self) -> StoreStats {
        let state = self.state.lock().await;
        StoreStats {
            nodes: state.nodes.len(),
            edges: state.edge_count(),
            committed_mutations: state.committed_mutations,
        }
    }

    /// Targets of outgoing `rel` edges, ordered by id.
    pub async fn outgoing(&self, node: NodeId, rel: RelType) -> Vec<NodeId> {
        let state = self.state.lock().await;
        state
            .outgoing
            .get(&(node, rel))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Labels of a node.
    pub async fn labels(&self, node: NodeId) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .nodes
            .get(&node)
            .map(|record| record.labels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Read a property.
    pub async fn property(&self, node: NodeId, key: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state
            .nodes
            .get(&node)
            .and_then(|record| record.properties.get(key).cloned())
    }

    /// Nodes carrying a label, ordered by id.
    pub async fn nodes_with_label(&self, label: &str) -> Vec<NodeId> {
        let state = self.state.lock().await;
        state
            .by_label
            .get(label)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    type Error = InMemoryError;
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Self::Error> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(InMemoryTransaction {
            state: Some(guard),
            undo: Vec::new(),
        })
    }
}

/// Transaction over an [`InMemoryGraphStore`].
///
/// Holds the store lock until committed, rolled back or dropped.
#[derive(Debug)]
pub struct InMemoryTransaction {
    state: Option<OwnedMutexGuard<GraphState>>,
    undo: Vec<Undo>,
}

impl InMemoryTransaction {
    fn state(&mut self) -> Result<&mut GraphState, InMemoryError> {
        self.state
            .as_deref_mut()
            .ok_or(InMemoryError::TransactionClosed)
    }

    fn abort(&mut self) {
        if let Some(mut state) = self.state.take() {
            while let Some(op) = self.undo.pop() {
                state.undo(op);
            }
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.state.is_some() && !self.undo.is_empty() {
            tracing::debug!(writes = self.undo.len(), "Rolling back dropped transaction");
        }
        self.abort();
    }
}

#[async_trait]
impl GraphTransaction for InMemoryTransaction {
    type Error = InMemoryError;

    async fn create_node(&mut self, labels: &[&str]) -> Result<NodeId, Self::Error> {
        let state = self.state()?;
        state.next_id += 1;
        let id = NodeId::new(state.next_id);
        let record = NodeRecord {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: BTreeMap::new(),
        };
        for label in &record.labels {
            state.by_label.entry(label.clone()).or_default().insert(id);
        }
        state.nodes.insert(id, record);
        self.undo.push(Undo::CreateNode(id));
        Ok(id)
    }

    async fn node_exists(&mut self, node: NodeId) -> Result<bool, Self::Error> {
        Ok(self.state()?.nodes.contains_key(&node))
    }

    async fn labels(&mut self, node: NodeId) -> Result<Vec<String>, Self::Error> {
        Ok(self
            .state()?
            .nodes
            .get(&node)
            .map(|record| record.labels.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn nodes_with_label(&mut self, label: &str) -> Result<Vec<NodeId>, Self::Error> {
        Ok(self
            .state()?
            .by_label
            .get(label)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn get_or_create_singleton(&mut self, label: &str) -> Result<NodeId, Self::Error> {
        let existing = self
            .state()?
            .by_label
            .get(label)
            .and_then(|set| set.iter().next().copied());
        match existing {
            Some(id) => Ok(id),
            None => self.create_node(&[label]).await,
        }
    }

    async fn set_property(&mut self, node: NodeId, key: &str, value: Value) -> Result<(), Self::Error> {
        let state = self.state()?;
        let record = state
            .nodes
            .get_mut(&node)
            .ok_or(InMemoryError::NodeNotFound(node))?;
        if record.properties.get(key) == Some(&value) {
            return Ok(());
        }
        let previous = record.properties.insert(key.to_string(), value);
        self.undo.push(Undo::SetProperty {
            node,
            key: key.to_string(),
            previous,
        });
        Ok(())
    }

    async fn get_property(&mut self, node: NodeId, key: &str) -> Result<Option<Value>, Self::Error> {
        let state = self.state()?;
        let record = state.nodes.get(&node).ok_or(InMemoryError::NodeNotFound(node))?;
        Ok(record.properties.get(key).cloned())
    }

    async fn create_edge(&mut self, from: NodeId, to: NodeId, rel: RelType) -> Result<(), Self::Error> {
        let state = self.state()?;
        state.require(from)?;
        state.require(to)?;
        if state.insert_edge(from, rel, to) {
            self.undo.push(Undo::CreateEdge { from, rel, to });
        }
        Ok(())
    }

    async fn replace_edge(&mut self, from: NodeId, rel: RelType, to: NodeId) -> Result<(), Self::Error> {
        let current = self.outgoing(from, rel).await?;
        if current == [to] {
            return Ok(());
        }
        for old in current {
            self.delete_edge(from, rel, old).await?;
        }
        self.create_edge(from, to, rel).await
    }

    async fn delete_edge(&mut self, from: NodeId, rel: RelType, to: NodeId) -> Result<(), Self::Error> {
        if self.state()?.remove_edge(from, rel, to) {
            self.undo.push(Undo::DeleteEdge { from, rel, to });
        }
        Ok(())
    }

    async fn outgoing(&mut self, node: NodeId, rel: RelType) -> Result<Vec<NodeId>, Self::Error> {
        Ok(self
            .state()?
            .outgoing
            .get(&(node, rel))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn incoming(&mut self, node: NodeId, rel: RelType) -> Result<Vec<NodeId>, Self::Error> {
        Ok(self
            .state()?
            .incoming
            .get(&(node, rel))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn commit(mut self) -> Result<(), Self::Error> {
        let writes = self.undo.len() as u64;
        let mut state = self.state.take().ok_or(InMemoryError::TransactionClosed)?;
        state.committed_mutations += writes;
        self.undo.clear();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), Self::Error> {
        if self.state.is_none() {
            return Err(InMemoryError::TransactionClosed);
        }
        self.abort();
        Ok(())
    }
}
