//! Time tree engine.
//!
//! Resolves instants and ranges to tree nodes, creating missing nodes on the
//! way down.
//!
//! ## Algorithm
//!
//! Point query:
//! 1. Decompose the instant into `[Year, Month, ..., resolution]` values
//! 2. Starting at the root, find each value among the current node's
//!    children, inserting it if absent, and descend
//! 3. The node reached at the last level is the leaf
//!
//! Range query:
//! 1. Step a cursor from `start` one resolution unit at a time while the unit
//!    start is `<= end`
//! 2. Keep the path of the previous leaf; only levels whose value changed are
//!    re-resolved, beginning at the previous sibling's NEXT edge
//! 3. Collect each leaf the first time it is reached
//!
//! Each operation runs in a single store transaction and commits at the end.
//! The engine holds no state between calls.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono_tz::Tz;
use serde::Serialize;

use crate::accessor;
use crate::calendar::{self, CalendarUnit, Clock, SystemClock};
use crate::config::TimeTreeConfig;
use crate::error::TimeTreeError;
use crate::root::Root;
use crate::store::{GraphStore, GraphTransaction};
use crate::types::{NodeId, RelType, Resolution, TimeInstant, TimeRange, TreeNode};

/// Node counts found by [`TimeTree::verify_integrity`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Nodes checked per level.
    pub nodes_per_level: BTreeMap<Resolution, usize>,
}

impl IntegrityReport {
    /// Total number of tree nodes below the root.
    pub fn total_nodes(&self) -> usize {
        self.nodes_per_level.values().sum()
    }

    /// Number of nodes at one level.
    pub fn count(&self, level: Resolution) -> usize {
        self.nodes_per_level.get(&level).copied().unwrap_or(0)
    }
}

/// Calendar-aligned time tree over a graph store.
pub struct TimeTree<S: GraphStore, C: Clock = SystemClock> {
    store: Arc<S>,
    config: TimeTreeConfig,
    clock: C,
}

impl<S: GraphStore> TimeTree<S> {
    /// Create a tree with default configuration and the system clock.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, TimeTreeConfig::default())
    }

    /// Create a tree with the given defaults and the system clock.
    pub fn with_config(store: Arc<S>, config: TimeTreeConfig) -> Self {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<S: GraphStore, C: Clock> TimeTree<S, C> {
    /// Create a tree with an explicit clock.
    pub fn with_clock(store: Arc<S>, config: TimeTreeConfig, clock: C) -> Self {
        Self { store, config, clock }
    }

    /// Get the configuration.
    pub fn config(&self) -> &TimeTreeConfig {
        &self.config
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Resolve a root to its node, creating the singleton root if needed.
    pub async fn resolve_root(&self, root: Root) -> Result<NodeId, TimeTreeError> {
        let mut tx = self.begin().await?;
        let root_id = root.get_or_create(&mut tx).await?;
        tx.commit().await.map_err(TimeTreeError::from_store)?;
        Ok(root_id)
    }

    /// Get the leaf for an instant, creating any missing nodes.
    ///
    /// Idempotent: a repeated call returns the same node and writes nothing.
    pub async fn get_or_create_instant(
        &self,
        root: Root,
        instant: TimeInstant,
    ) -> Result<TreeNode, TimeTreeError> {
        let (resolution, tz) = self.config.resolve_instant(&instant);
        let units = calendar::decompose(instant.millis, tz, resolution)?;

        let mut tx = self.begin().await?;
        let root_id = root.get_or_create(&mut tx).await?;
        let mut parent = root_id;
        let mut leaf = None;
        for unit in &units {
            let node = accessor::get_or_create_child(&mut tx, parent, unit.resolution, unit.value).await?;
            parent = node.id;
            leaf = Some(node);
        }
        tx.commit().await.map_err(TimeTreeError::from_store)?;

        leaf.ok_or(TimeTreeError::InvalidTimestamp(instant.millis))
    }

    /// Get the leaf for an instant if it exists; never writes.
    pub async fn get_instant(
        &self,
        root: Root,
        instant: TimeInstant,
    ) -> Result<Option<TreeNode>, TimeTreeError> {
        let (resolution, tz) = self.config.resolve_instant(&instant);
        let units = calendar::decompose(instant.millis, tz, resolution)?;

        let mut tx = self.begin().await?;
        let Some(mut parent) = root.find(&mut tx).await? else {
            return Ok(None);
        };
        let mut leaf = None;
        for unit in &units {
            match accessor::find_child(&mut tx, parent, unit.resolution, unit.value).await? {
                Some(node) => {
                    parent = node.id;
                    leaf = Some(node);
                }
                None => return Ok(None),
            }
        }
        tx.rollback().await.map_err(TimeTreeError::from_store)?;
        Ok(leaf)
    }

    /// Get the leaf for the current instant, creating any missing nodes.
    pub async fn now(
        &self,
        root: Root,
        resolution: Option<Resolution>,
        time_zone: Option<Tz>,
    ) -> Result<TreeNode, TimeTreeError> {
        let instant = TimeInstant {
            millis: self.clock.now().timestamp_millis(),
            resolution,
            time_zone,
        };
        self.get_or_create_instant(root, instant).await
    }

    /// Get every leaf from the unit containing `start` through the unit
    /// containing `end`, creating any missing nodes.
    ///
    /// Leaves are returned in the order the range first reaches them, which
    /// is ascending except where a DST fall-back repeats local time. Each
    /// leaf appears once.
    pub async fn get_or_create_range(
        &self,
        root: Root,
        range: TimeRange,
    ) -> Result<Vec<TreeNode>, TimeTreeError> {
        check_order(&range)?;
        let (resolution, tz) = self.config.resolve_range(&range);

        let mut tx = self.begin().await?;
        let root_id = root.get_or_create(&mut tx).await?;

        let mut path: Vec<TreeNode> = Vec::with_capacity(resolution.depth() + 1);
        let mut leaves = Leaves::default();
        let mut cursor = range.start;
        loop {
            let units = calendar::decompose(cursor, tz, resolution)?;
            let shared = shared_prefix(&path, &units);

            if shared < units.len() {
                let mut sibling = path.get(shared).copied();
                path.truncate(shared);
                for unit in &units[shared..] {
                    let parent = path.last().map_or(root_id, |n| n.id);
                    let node = match sibling.take() {
                        Some(previous) => {
                            accessor::next_or_create(&mut tx, parent, previous, unit.value).await?
                        }
                        None => {
                            accessor::get_or_create_child(&mut tx, parent, unit.resolution, unit.value)
                                .await?
                        }
                    };
                    path.push(node);
                }
                if let Some(leaf) = path.last() {
                    leaves.push(*leaf);
                }
            }

            let next = calendar::next_unit_start(cursor, tz, resolution)?;
            if next > range.end {
                break;
            }
            cursor = next;
        }
        tx.commit().await.map_err(TimeTreeError::from_store)?;

        tracing::debug!(
            root = %root_id,
            resolution = %resolution,
            leaves = leaves.nodes.len(),
            "Range materialized"
        );
        Ok(leaves.nodes)
    }

    /// Get the existing leaves from the unit containing `start` through the
    /// unit containing `end`; never writes.
    ///
    /// Steps the same units as [`TimeTree::get_or_create_range`], so both
    /// agree on membership and order. A missing node skips the rest of its
    /// unit at once.
    pub async fn get_range(&self, root: Root, range: TimeRange) -> Result<Vec<TreeNode>, TimeTreeError> {
        check_order(&range)?;
        let (resolution, tz) = self.config.resolve_range(&range);

        let mut tx = self.begin().await?;
        let Some(root_id) = root.find(&mut tx).await? else {
            return Ok(Vec::new());
        };

        let mut path: Vec<TreeNode> = Vec::with_capacity(resolution.depth() + 1);
        let mut leaves = Leaves::default();
        let mut cursor = range.start;
        loop {
            let units = calendar::decompose(cursor, tz, resolution)?;
            let shared = shared_prefix(&path, &units);
            path.truncate(shared);

            let mut step = resolution;
            for unit in &units[shared..] {
                let parent = path.last().map_or(root_id, |n| n.id);
                match accessor::find_child(&mut tx, parent, unit.resolution, unit.value).await? {
                    Some(node) => path.push(node),
                    None => {
                        step = unit.resolution;
                        break;
                    }
                }
            }
            if path.len() == units.len() {
                if let Some(leaf) = path.last() {
                    leaves.push(*leaf);
                }
            }

            let next = calendar::next_unit_start(cursor, tz, step)?;
            if next > range.end {
                break;
            }
            cursor = next;
        }
        tx.rollback().await.map_err(TimeTreeError::from_store)?;
        Ok(leaves.nodes)
    }

    /// Children of `parent` in ascending order.
    ///
    /// `level` is the level of the children: [`Resolution::Year`] below a
    /// root, whatever labels the root carries.
    pub async fn children(&self, parent: NodeId, level: Resolution) -> Result<Vec<TreeNode>, TimeTreeError> {
        let mut tx = self.begin().await?;
        if !tx.node_exists(parent).await.map_err(TimeTreeError::from_store)? {
            return Err(TimeTreeError::MissingRoot(parent));
        }
        let children = accessor::children(&mut tx, parent, level).await?;
        tx.rollback().await.map_err(TimeTreeError::from_store)?;
        Ok(children)
    }

    /// Check every parent below `root` against the linkage invariants.
    ///
    /// Reports the first violation as [`TimeTreeError::CorruptTree`]; nothing
    /// is repaired.
    pub async fn verify_integrity(&self, root: Root) -> Result<IntegrityReport, TimeTreeError> {
        let mut report = IntegrityReport::default();
        let mut tx = self.begin().await?;
        let Some(root_id) = root.find(&mut tx).await? else {
            return Ok(report);
        };

        let mut queue = VecDeque::from([(root_id, Resolution::Year)]);
        while let Some((parent, level)) = queue.pop_front() {
            for child in accessor::children(&mut tx, parent, level).await? {
                *report.nodes_per_level.entry(level).or_default() += 1;
                match level.child() {
                    Some(next) => queue.push_back((child.id, next)),
                    None => {
                        let below = tx
                            .outgoing(child.id, RelType::Child)
                            .await
                            .map_err(TimeTreeError::from_store)?;
                        if !below.is_empty() {
                            return Err(TimeTreeError::corrupt(child.id, "finest level has children"));
                        }
                    }
                }
            }
        }
        tx.rollback().await.map_err(TimeTreeError::from_store)?;

        tracing::debug!(root = %root_id, nodes = report.total_nodes(), "Integrity verified");
        Ok(report)
    }

    async fn begin(&self) -> Result<S::Transaction, TimeTreeError> {
        self.store.begin().await.map_err(TimeTreeError::from_store)
    }
}

fn check_order(range: &TimeRange) -> Result<(), TimeTreeError> {
    if range.end < range.start {
        return Err(TimeTreeError::InvalidRange {
            start: range.start,
            end: range.end,
        });
    }
    Ok(())
}

/// Number of leading levels where `path` already matches `units`.
fn shared_prefix(path: &[TreeNode], units: &[CalendarUnit]) -> usize {
    path.iter()
        .zip(units)
        .take_while(|(node, unit)| node.value == unit.value)
        .count()
}

/// Range result that keeps the first occurrence of each leaf.
///
/// A DST fall-back walks the repeated local hour twice; below Hour
/// resolution that revisits leaves without repeating the whole path.
#[derive(Default)]
struct Leaves {
    nodes: Vec<TreeNode>,
    seen: BTreeSet<NodeId>,
}

impl Leaves {
    fn push(&mut self, leaf: TreeNode) {
        if self.seen.insert(leaf.id) {
            self.nodes.push(leaf);
        }
    }
}
