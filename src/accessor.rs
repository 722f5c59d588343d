//! Sibling-chain access for tree nodes.
//!
//! Every parent keeps its children in an ascending chain:
//!
//! ```text
//!   parent ──FIRST──▶ c(2) ──NEXT──▶ c(4) ──NEXT──▶ c(9) ◀──LAST── parent
//!      └─────────────CHILD (to each of c2, c4, c9)───────────┘
//! ```
//!
//! [`find_child`] and [`insert_child`] are the only primitives; the engine
//! composes them level by level. Lookups scan from whichever end of the chain
//! is numerically closer and stop as soon as ascending order rules the value
//! out. Any contradiction between labels, values and linkage is reported as
//! [`TimeTreeError::CorruptTree`] and left untouched.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::TimeTreeError;
use crate::store::GraphTransaction;
use crate::types::{NodeId, RelType, Resolution, TreeNode, VALUE_PROPERTY};

/// Where a value sits among a parent's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Found(TreeNode),
    Vacant(Insertion),
}

/// How a new child is spliced into the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Insertion {
    /// Parent has no children yet.
    Only,
    /// Smaller than the current FIRST.
    Before(NodeId),
    /// Larger than the current LAST.
    After(NodeId),
    /// Between two adjacent siblings.
    Between(NodeId, NodeId),
}

/// Find the child of `parent` holding `value`.
pub async fn find_child<T: GraphTransaction>(
    tx: &mut T,
    parent: NodeId,
    level: Resolution,
    value: i32,
) -> Result<Option<TreeNode>, TimeTreeError> {
    match locate(tx, parent, level, value).await? {
        Slot::Found(node) => Ok(Some(node)),
        Slot::Vacant(_) => Ok(None),
    }
}

/// Create the child of `parent` holding `value` and splice it into the chain.
///
/// Fails with [`TimeTreeError::DuplicateChild`] if the value already exists.
pub async fn insert_child<T: GraphTransaction>(
    tx: &mut T,
    parent: NodeId,
    level: Resolution,
    value: i32,
) -> Result<TreeNode, TimeTreeError> {
    match locate(tx, parent, level, value).await? {
        Slot::Found(_) => Err(TimeTreeError::DuplicateChild { parent, value }),
        Slot::Vacant(insertion) => splice(tx, parent, level, value, insertion).await,
    }
}

/// [`find_child`], falling back to [`insert_child`] on a miss.
pub async fn get_or_create_child<T: GraphTransaction>(
    tx: &mut T,
    parent: NodeId,
    level: Resolution,
    value: i32,
) -> Result<TreeNode, TimeTreeError> {
    match locate(tx, parent, level, value).await? {
        Slot::Found(node) => Ok(node),
        Slot::Vacant(insertion) => splice(tx, parent, level, value, insertion).await,
    }
}

/// Get or create the sibling holding `value`, starting from `previous`.
///
/// When `value` belongs right after `previous` this costs one NEXT hop
/// instead of a chain scan; otherwise it falls back to
/// [`get_or_create_child`].
pub async fn next_or_create<T: GraphTransaction>(
    tx: &mut T,
    parent: NodeId,
    previous: TreeNode,
    value: i32,
) -> Result<TreeNode, TimeTreeError> {
    let level = previous.resolution;
    if previous.value < value {
        match single(tx, previous.id, RelType::Next).await? {
            Some(next) => {
                let next_value = value_of(tx, next).await?;
                if next_value == value {
                    return load(tx, next, level).await;
                }
                if next_value > value {
                    let insertion = Insertion::Between(previous.id, next);
                    return splice(tx, parent, level, value, insertion).await;
                }
            }
            None => {
                if single(tx, parent, RelType::Last).await? == Some(previous.id) {
                    return splice(tx, parent, level, value, Insertion::After(previous.id)).await;
                }
            }
        }
    }
    get_or_create_child(tx, parent, level, value).await
}

/// Children of `parent` in chain order, validating the linkage invariants.
///
/// Checks that the chain from FIRST reaches LAST in strictly ascending
/// order, visits exactly the CHILD set, and that every child carries the
/// `level` label.
pub async fn children<T: GraphTransaction>(
    tx: &mut T,
    parent: NodeId,
    level: Resolution,
) -> Result<Vec<TreeNode>, TimeTreeError> {
    let child_set: BTreeSet<NodeId> = tx
        .outgoing(parent, RelType::Child)
        .await
        .map_err(TimeTreeError::from_store)?
        .into_iter()
        .collect();
    let Some((first, last)) = ends(tx, parent).await? else {
        if !child_set.is_empty() {
            return Err(TimeTreeError::corrupt(parent, "children without FIRST/LAST"));
        }
        return Ok(Vec::new());
    };

    let mut result: Vec<TreeNode> = Vec::with_capacity(child_set.len());
    let mut current = Some(first);
    while let Some(id) = current {
        if !child_set.contains(&id) {
            return Err(TimeTreeError::corrupt(id, "NEXT chain member missing from CHILD"));
        }
        if result.len() == child_set.len() {
            return Err(TimeTreeError::corrupt(id, "NEXT chain longer than CHILD set"));
        }
        let node = load(tx, id, level).await?;
        if let Some(previous) = result.last() {
            if node.value <= previous.value {
                return Err(TimeTreeError::corrupt(id, "NEXT chain not ascending"));
            }
        }
        result.push(node);
        current = single(tx, id, RelType::Next).await?;
        if id == last {
            if current.is_some() {
                return Err(TimeTreeError::corrupt(id, "LAST child has a NEXT edge"));
            }
            break;
        }
    }

    if result.last().map(|n| n.id) != Some(last) {
        return Err(TimeTreeError::corrupt(parent, "NEXT chain does not reach LAST"));
    }
    if result.len() != child_set.len() {
        return Err(TimeTreeError::corrupt(parent, "CHILD edges outside the NEXT chain"));
    }
    Ok(result)
}

/// Read a node as a tree node of `level`.
pub async fn load<T: GraphTransaction>(
    tx: &mut T,
    id: NodeId,
    level: Resolution,
) -> Result<TreeNode, TimeTreeError> {
    let labels = tx.labels(id).await.map_err(TimeTreeError::from_store)?;
    if !labels.iter().any(|l| l == level.label()) {
        return Err(TimeTreeError::corrupt(
            id,
            format!("expected label {}, found {:?}", level, labels),
        ));
    }
    let value = value_of(tx, id).await?;
    Ok(TreeNode::new(id, level, value))
}

async fn locate<T: GraphTransaction>(
    tx: &mut T,
    parent: NodeId,
    level: Resolution,
    value: i32,
) -> Result<Slot, TimeTreeError> {
    let Some((first, last)) = ends(tx, parent).await? else {
        return Ok(Slot::Vacant(Insertion::Only));
    };

    let first_value = value_of(tx, first).await?;
    if value < first_value {
        return Ok(Slot::Vacant(Insertion::Before(first)));
    }
    if value == first_value {
        return Ok(Slot::Found(load(tx, first, level).await?));
    }

    let last_value = value_of(tx, last).await?;
    if value > last_value {
        return Ok(Slot::Vacant(Insertion::After(last)));
    }
    if value == last_value {
        return Ok(Slot::Found(load(tx, last, level).await?));
    }

    if i64::from(value) - i64::from(first_value) <= i64::from(last_value) - i64::from(value) {
        scan_forward(tx, first, first_value, level, value).await
    } else {
        scan_backward(tx, last, last_value, level, value).await
    }
}

/// Walk NEXT edges from `start` until the chain passes `value`.
async fn scan_forward<T: GraphTransaction>(
    tx: &mut T,
    start: NodeId,
    start_value: i32,
    level: Resolution,
    value: i32,
) -> Result<Slot, TimeTreeError> {
    let (mut current, mut current_value) = (start, start_value);
    loop {
        let next = single(tx, current, RelType::Next)
            .await?
            .ok_or_else(|| TimeTreeError::corrupt(current, "NEXT chain ends before LAST"))?;
        let next_value = value_of(tx, next).await?;
        tracing::trace!(node = %next, value = next_value, wanted = value, "scan forward");
        if next_value <= current_value {
            return Err(TimeTreeError::corrupt(next, "NEXT chain not ascending"));
        }
        if next_value == value {
            return Ok(Slot::Found(load(tx, next, level).await?));
        }
        if next_value > value {
            return Ok(Slot::Vacant(Insertion::Between(current, next)));
        }
        current = next;
        current_value = next_value;
    }
}

/// Walk incoming NEXT edges from `start` until the chain passes `value`.
async fn scan_backward<T: GraphTransaction>(
    tx: &mut T,
    start: NodeId,
    start_value: i32,
    level: Resolution,
    value: i32,
) -> Result<Slot, TimeTreeError> {
    let (mut current, mut current_value) = (start, start_value);
    loop {
        let previous = single_incoming(tx, current, RelType::Next)
            .await?
            .ok_or_else(|| TimeTreeError::corrupt(current, "NEXT chain ends before FIRST"))?;
        let previous_value = value_of(tx, previous).await?;
        tracing::trace!(node = %previous, value = previous_value, wanted = value, "scan backward");
        if previous_value >= current_value {
            return Err(TimeTreeError::corrupt(previous, "NEXT chain not ascending"));
        }
        if previous_value == value {
            return Ok(Slot::Found(load(tx, previous, level).await?));
        }
        if previous_value < value {
            return Ok(Slot::Vacant(Insertion::Between(previous, current)));
        }
        current = previous;
        current_value = previous_value;
    }
}

async fn splice<T: GraphTransaction>(
    tx: &mut T,
    parent: NodeId,
    level: Resolution,
    value: i32,
    insertion: Insertion,
) -> Result<TreeNode, TimeTreeError> {
    let id = tx
        .create_node(&[level.label()])
        .await
        .map_err(TimeTreeError::from_store)?;
    tx.set_property(id, VALUE_PROPERTY, Value::from(value))
        .await
        .map_err(TimeTreeError::from_store)?;
    tx.create_edge(parent, id, RelType::Child)
        .await
        .map_err(TimeTreeError::from_store)?;

    match insertion {
        Insertion::Only => {
            tx.replace_edge(parent, RelType::First, id).await.map_err(TimeTreeError::from_store)?;
            tx.replace_edge(parent, RelType::Last, id).await.map_err(TimeTreeError::from_store)?;
        }
        Insertion::Before(first) => {
            tx.replace_edge(parent, RelType::First, id).await.map_err(TimeTreeError::from_store)?;
            tx.create_edge(id, first, RelType::Next).await.map_err(TimeTreeError::from_store)?;
        }
        Insertion::After(last) => {
            tx.create_edge(last, id, RelType::Next).await.map_err(TimeTreeError::from_store)?;
            tx.replace_edge(parent, RelType::Last, id).await.map_err(TimeTreeError::from_store)?;
        }
        Insertion::Between(previous, next) => {
            tx.replace_edge(previous, RelType::Next, id).await.map_err(TimeTreeError::from_store)?;
            tx.create_edge(id, next, RelType::Next).await.map_err(TimeTreeError::from_store)?;
        }
    }

    tracing::debug!(
        parent = %parent,
        node = %id,
        resolution = %level,
        value = value,
        insertion = ?insertion,
        "Created tree node"
    );
    Ok(TreeNode::new(id, level, value))
}

/// FIRST and LAST of a parent; both or neither must exist.
async fn ends<T: GraphTransaction>(
    tx: &mut T,
    parent: NodeId,
) -> Result<Option<(NodeId, NodeId)>, TimeTreeError> {
    let first = single(tx, parent, RelType::First).await?;
    let last = single(tx, parent, RelType::Last).await?;
    match (first, last) {
        (None, None) => Ok(None),
        (Some(first), Some(last)) => Ok(Some((first, last))),
        _ => Err(TimeTreeError::corrupt(parent, "only one of FIRST/LAST present")),
    }
}

async fn single<T: GraphTransaction>(
    tx: &mut T,
    node: NodeId,
    rel: RelType,
) -> Result<Option<NodeId>, TimeTreeError> {
    let targets = tx.outgoing(node, rel).await.map_err(TimeTreeError::from_store)?;
    match targets.as_slice() {
        [] => Ok(None),
        [target] => Ok(Some(*target)),
        _ => Err(TimeTreeError::corrupt(node, format!("multiple outgoing {} edges", rel))),
    }
}

async fn single_incoming<T: GraphTransaction>(
    tx: &mut T,
    node: NodeId,
    rel: RelType,
) -> Result<Option<NodeId>, TimeTreeError> {
    let sources = tx.incoming(node, rel).await.map_err(TimeTreeError::from_store)?;
    match sources.as_slice() {
        [] => Ok(None),
        [source] => Ok(Some(*source)),
        _ => Err(TimeTreeError::corrupt(node, format!("multiple incoming {} edges", rel))),
    }
}

async fn value_of<T: GraphTransaction>(tx: &mut T, node: NodeId) -> Result<i32, TimeTreeError> {
    let value = tx
        .get_property(node, VALUE_PROPERTY)
        .await
        .map_err(TimeTreeError::from_store)?;
    value
        .as_ref()
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| TimeTreeError::corrupt(node, "missing or non-integer value property"))
}
