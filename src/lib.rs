//! # timetree
//!
//! Calendar-aligned time index over a graph store.
//!
//! The tree answers one question:
//!
//! > Given an instant (or a range of instants), which node represents it?
//!
//! ## Core Contract
//!
//! 1. Time is a hierarchy `Root → Year → Month → Day → Hour → Minute → Second → Millisecond`
//! 2. Nodes are created lazily, on first request, and never duplicated
//! 3. Siblings are ordered: every parent has FIRST and LAST edges and its
//!    children form an ascending NEXT chain
//!
//! ## Architecture
//!
//! ```text
//! TimeInstant / TimeRange → calendar::decompose → TimeTree → accessor
//!                                                               ↓
//!                                             GraphStore (Postgres or Memory)
//! ```
//!
//! ## Guarantees
//!
//! - Repeated requests return the same nodes and write nothing
//! - Every operation is atomic: it commits fully or leaves no trace
//! - Range results follow time order and contain each leaf once

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod calendar;
pub mod config;
pub mod store;
pub mod accessor;
pub mod root;
pub mod timetree;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    NodeId, RelType, Resolution, TimeInstant, TimeRange, TreeNode, TIME_TREE_ROOT_LABEL,
    VALUE_PROPERTY,
};
pub use error::TimeTreeError;
pub use calendar::{decompose, max_unit_count, next_unit_start, parse_time_zone, CalendarUnit, Clock, ManualClock, SystemClock};
pub use config::TimeTreeConfig;
pub use store::{GraphStore, GraphTransaction, InMemoryGraphStore};
#[cfg(feature = "postgres")]
pub use store::PostgresGraphStore;
pub use root::Root;
pub use timetree::{IntegrityReport, TimeTree};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version of the tree layout (labels, relationship types, value
/// property). Increment on breaking changes.
pub const TIMETREE_SCHEMA_VERSION: &str = "1.0.0";
