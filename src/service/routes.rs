//! Axum routes for the TimeTree service.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::calendar::{max_unit_count, parse_time_zone};
use crate::error::TimeTreeError;
use crate::root::Root;
use crate::store::GraphStore;
use crate::types::{NodeId, Resolution, TimeInstant, TimeRange, TreeNode};
use crate::TIMETREE_SCHEMA_VERSION;

use super::middleware::record_tree_metrics;
use super::state::ServiceState;

type SharedState<S> = Arc<ServiceState<S>>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Optional per-request overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeParams {
    /// Finest level to resolve (`year` .. `millisecond`).
    pub resolution: Option<String>,
    /// IANA zone id, e.g. `Europe/Prague`.
    pub timezone: Option<String>,
}

impl TreeParams {
    fn resolution(&self) -> Result<Option<Resolution>, ApiError> {
        self.resolution
            .as_deref()
            .map(|raw| {
                Resolution::from_str(raw).ok_or_else(|| {
                    ApiError::BadRequest(
                        "INVALID_RESOLUTION",
                        format!("Unknown resolution: {}", raw),
                    )
                })
            })
            .transpose()
    }

    fn time_zone(&self) -> Result<Option<chrono_tz::Tz>, ApiError> {
        self.timezone
            .as_deref()
            .map(parse_time_zone)
            .transpose()
            .map_err(ApiError::Tree)
    }

    fn instant(&self, millis: i64) -> Result<TimeInstant, ApiError> {
        Ok(TimeInstant {
            millis,
            resolution: self.resolution()?,
            time_zone: self.time_zone()?,
        })
    }

    fn range(&self, start: i64, end: i64) -> Result<TimeRange, ApiError> {
        Ok(TimeRange {
            start,
            end,
            resolution: self.resolution()?,
            time_zone: self.time_zone()?,
        })
    }
}

/// Scalar properties of a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProperties {
    /// Calendar value of the node.
    pub value: i32,
}

/// Serializable tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDto {
    /// Store id.
    pub id: NodeId,
    /// Level label, e.g. `["Day"]`.
    pub labels: Vec<String>,
    /// Node properties.
    pub properties: NodeProperties,
}

impl From<TreeNode> for NodeDto {
    fn from(node: TreeNode) -> Self {
        Self {
            id: node.id,
            labels: vec![node.resolution.label().to_string()],
            properties: NodeProperties { value: node.value },
        }
    }
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub schema_version: String,
    pub default_resolution: Resolution,
    pub default_time_zone: String,
    pub store_healthy: bool,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub store: bool,
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
}

/// Handler error, mapped to a status code and an [`ErrorResponse`].
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request parameter.
    BadRequest(&'static str, String),
    /// Read-only lookup found nothing.
    NotFound(String),
    /// Tree operation failed.
    Tree(TimeTreeError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(code, _) => (StatusCode::BAD_REQUEST, *code),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NODE_NOT_FOUND"),
            Self::Tree(err) => match err {
                TimeTreeError::InvalidTimestamp(_) => (StatusCode::BAD_REQUEST, "INVALID_TIMESTAMP"),
                TimeTreeError::InvalidTimeZone(_) => (StatusCode::BAD_REQUEST, "INVALID_TIME_ZONE"),
                TimeTreeError::InvalidRange { .. } => (StatusCode::BAD_REQUEST, "INVALID_RANGE"),
                TimeTreeError::MissingRoot(_) => (StatusCode::NOT_FOUND, "MISSING_ROOT"),
                TimeTreeError::DuplicateChild { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "DUPLICATE_CHILD"),
                TimeTreeError::CorruptTree { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPT_TREE"),
                TimeTreeError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            },
        }
    }
}

impl From<TimeTreeError> for ApiError {
    fn from(err: TimeTreeError) -> Self {
        Self::Tree(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.status_and_code();
        let error = match self {
            Self::BadRequest(_, message) | Self::NotFound(message) => message,
            Self::Tree(err) => err.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(code, error = %error, "Request failed");
        } else {
            tracing::warn!(code, error = %error, "Request error");
        }
        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Reject ranges too large to serve in one request.
///
/// Inverted ranges pass through so the engine reports them as `INVALID_RANGE`.
fn check_range_size<S: GraphStore + 'static>(
    state: &ServiceState<S>,
    range: &TimeRange,
) -> Result<(), ApiError> {
    let (resolution, _) = state.tree.config().resolve_range(range);
    let units = max_unit_count(range.start, range.end, resolution);
    if range.end >= range.start && units > state.max_range_units {
        return Err(ApiError::BadRequest(
            "RANGE_TOO_LARGE",
            format!(
                "Range may span up to {} {} units, limit is {}",
                units,
                resolution.label(),
                state.max_range_units
            ),
        ));
    }
    Ok(())
}

async fn create_instant<S: GraphStore + 'static>(
    state: &ServiceState<S>,
    root: Root,
    time: i64,
    params: &TreeParams,
) -> Result<Json<NodeDto>, ApiError> {
    let started = Instant::now();
    let node = state.tree.get_or_create_instant(root, params.instant(time)?).await?;
    record_tree_metrics("single", 1, started.elapsed().as_millis() as u64);
    Ok(Json(node.into()))
}

async fn lookup_instant<S: GraphStore + 'static>(
    state: &ServiceState<S>,
    root: Root,
    time: i64,
    params: &TreeParams,
) -> Result<Json<NodeDto>, ApiError> {
    state
        .tree
        .get_instant(root, params.instant(time)?)
        .await?
        .map(|node| Json(node.into()))
        .ok_or_else(|| ApiError::NotFound(format!("No node for instant {}", time)))
}

async fn create_range<S: GraphStore + 'static>(
    state: &ServiceState<S>,
    root: Root,
    start: i64,
    end: i64,
    params: &TreeParams,
) -> Result<Json<Vec<NodeDto>>, ApiError> {
    let range = params.range(start, end)?;
    check_range_size(state, &range)?;
    let started = Instant::now();
    let nodes = state.tree.get_or_create_range(root, range).await?;
    record_tree_metrics("range", nodes.len(), started.elapsed().as_millis() as u64);
    Ok(Json(nodes.into_iter().map(NodeDto::from).collect()))
}

async fn lookup_range<S: GraphStore + 'static>(
    state: &ServiceState<S>,
    root: Root,
    start: i64,
    end: i64,
    params: &TreeParams,
) -> Result<Json<Vec<NodeDto>>, ApiError> {
    let range = params.range(start, end)?;
    check_range_size(state, &range)?;
    let nodes = state.tree.get_range(root, range).await?;
    Ok(Json(nodes.into_iter().map(NodeDto::from).collect()))
}

async fn create_now<S: GraphStore + 'static>(
    state: &ServiceState<S>,
    root: Root,
    params: &TreeParams,
) -> Result<Json<NodeDto>, ApiError> {
    let node = state
        .tree
        .now(root, params.resolution()?, params.time_zone()?)
        .await?;
    Ok(Json(node.into()))
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn single_post<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(time): Path<i64>,
    Query(params): Query<TreeParams>,
) -> Result<Json<NodeDto>, ApiError> {
    create_instant(&state, Root::Singleton, time, &params).await
}

async fn single_get<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(time): Path<i64>,
    Query(params): Query<TreeParams>,
) -> Result<Json<NodeDto>, ApiError> {
    lookup_instant(&state, Root::Singleton, time, &params).await
}

async fn range_post<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path((start, end)): Path<(i64, i64)>,
    Query(params): Query<TreeParams>,
) -> Result<Json<Vec<NodeDto>>, ApiError> {
    create_range(&state, Root::Singleton, start, end, &params).await
}

async fn range_get<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path((start, end)): Path<(i64, i64)>,
    Query(params): Query<TreeParams>,
) -> Result<Json<Vec<NodeDto>>, ApiError> {
    lookup_range(&state, Root::Singleton, start, end, &params).await
}

async fn now_post<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Query(params): Query<TreeParams>,
) -> Result<Json<NodeDto>, ApiError> {
    create_now(&state, Root::Singleton, &params).await
}

async fn rooted_single_post<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path((root_id, time)): Path<(u64, i64)>,
    Query(params): Query<TreeParams>,
) -> Result<Json<NodeDto>, ApiError> {
    create_instant(&state, Root::Explicit(NodeId::new(root_id)), time, &params).await
}

async fn rooted_single_get<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path((root_id, time)): Path<(u64, i64)>,
    Query(params): Query<TreeParams>,
) -> Result<Json<NodeDto>, ApiError> {
    lookup_instant(&state, Root::Explicit(NodeId::new(root_id)), time, &params).await
}

async fn rooted_range_post<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path((root_id, start, end)): Path<(u64, i64, i64)>,
    Query(params): Query<TreeParams>,
) -> Result<Json<Vec<NodeDto>>, ApiError> {
    create_range(&state, Root::Explicit(NodeId::new(root_id)), start, end, &params).await
}

async fn rooted_range_get<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path((root_id, start, end)): Path<(u64, i64, i64)>,
    Query(params): Query<TreeParams>,
) -> Result<Json<Vec<NodeDto>>, ApiError> {
    lookup_range(&state, Root::Explicit(NodeId::new(root_id)), start, end, &params).await
}

async fn rooted_now_post<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
    Path(root_id): Path<u64>,
    Query(params): Query<TreeParams>,
) -> Result<Json<NodeDto>, ApiError> {
    create_now(&state, Root::Explicit(NodeId::new(root_id)), &params).await
}

/// Health check endpoint (detailed).
async fn health_handler<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
) -> Json<HealthResponse> {
    let store_healthy = state.store().is_healthy().await;
    let config = state.tree.config();

    Json(HealthResponse {
        status: if store_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: TIMETREE_SCHEMA_VERSION.to_string(),
        default_resolution: config.default_resolution,
        default_time_zone: config.default_time_zone.name().to_string(),
        store_healthy,
    })
}

/// Liveness check endpoint. Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness check endpoint.
///
/// Returns 200 if the store is reachable, 503 otherwise.
async fn readiness_handler<S: GraphStore + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.store().is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            store: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                store: false,
                details: Some("Store connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the TimeTree service.
pub fn create_router<S: GraphStore + 'static>(state: ServiceState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Singleton root
        .route("/api/timetree/single/:time", post(single_post::<S>).get(single_get::<S>))
        .route("/api/timetree/range/:start/:end", post(range_post::<S>).get(range_get::<S>))
        .route("/api/timetree/now", post(now_post::<S>))
        // Custom roots
        .route(
            "/api/timetree/:root_id/single/:time",
            post(rooted_single_post::<S>).get(rooted_single_get::<S>),
        )
        .route(
            "/api/timetree/:root_id/range/:start/:end",
            post(rooted_range_post::<S>).get(rooted_range_get::<S>),
        )
        .route("/api/timetree/:root_id/now", post(rooted_now_post::<S>))
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}
