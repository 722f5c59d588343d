//! TimeTree REST Service
//!
//! Exposes the tree over HTTP. Time parameters are milliseconds since the
//! Unix epoch; `resolution` and `timezone` query parameters override the
//! configured defaults. Range requests larger than
//! [`ServiceState::max_range_units`] are refused with `RANGE_TOO_LARGE`.
//!
//! ## Endpoints
//!
//! - `POST /api/timetree/single/:time` - Get or create the node for an instant
//! - `GET /api/timetree/single/:time` - Look up the node for an instant
//! - `POST /api/timetree/range/:start/:end` - Get or create the nodes for a range
//! - `GET /api/timetree/range/:start/:end` - Look up existing nodes in a range
//! - `POST /api/timetree/now` - Get or create the node for the current instant
//! - `/api/timetree/:root_id/...` - The same operations on a custom root
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness check
//! - `GET /health/ready` - Readiness check

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_tree_metrics, request_span_middleware};
pub use routes::{create_router, ApiError, NodeDto, TreeParams};
pub use state::{ServiceState, DEFAULT_MAX_RANGE_UNITS};
