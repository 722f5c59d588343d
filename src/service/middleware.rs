//! Service middleware for request metrics and request spans.
//!
//! Metrics are emitted as structured tracing events under the
//! `timetree::metrics` target and can be aggregated from logs.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

const REQUEST_ID: &str = "x-request-id";

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "timetree::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Open a span per request carrying the tree operation and the root it
/// targets, so engine logs can be grouped by request.
///
/// The caller's `X-Request-Id` is kept (a fresh one is minted otherwise) and
/// echoed on the response.
pub async fn request_span_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let target = RequestTarget::parse(request.uri().path());

    let span = info_span!(
        "timetree_request",
        request_id = %request_id,
        method = %request.method(),
        operation = target.operation,
        root = %target.root_label(),
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID), value);
    }
    response
}

/// Tree operation and root addressed by a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestTarget {
    operation: &'static str,
    root: Option<u64>,
}

impl RequestTarget {
    fn parse(path: &str) -> Self {
        let mut segments = path.trim_start_matches('/').split('/');
        let other = Self { operation: "other", root: None };

        match segments.next() {
            Some("health") => return Self { operation: "health", root: None },
            Some("api") if segments.next() == Some("timetree") => {}
            _ => return other,
        }

        let (root, operation) = match segments.next() {
            Some(first) => match first.parse::<u64>() {
                Ok(id) => (Some(id), segments.next()),
                Err(_) => (None, Some(first)),
            },
            None => return other,
        };
        let operation = match operation {
            Some("single") => "single",
            Some("range") => "range",
            Some("now") => "now",
            _ => return other,
        };
        Self { operation, root }
    }

    fn root_label(&self) -> String {
        self.root.map_or_else(|| "singleton".to_string(), |id| id.to_string())
    }
}

fn numeric_segment() -> Option<&'static regex_lite::Regex> {
    static NUMERIC: OnceLock<Option<regex_lite::Regex>> = OnceLock::new();
    NUMERIC
        .get_or_init(|| regex_lite::Regex::new(r"^-?\d+$").ok())
        .as_ref()
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Timestamps and root ids become `:n`.
fn normalize_path(path: &str) -> String {
    let Some(numeric) = numeric_segment() else {
        return path.to_string();
    };
    path.split('/')
        .map(|segment| if numeric.is_match(segment) { ":n" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

/// Record the outcome of one tree operation.
pub fn record_tree_metrics(operation: &str, nodes: usize, latency_ms: u64) {
    info!(
        target: "timetree::metrics",
        metric_type = "tree",
        operation = operation,
        nodes = nodes,
        latency_ms = latency_ms,
        "tree_metric"
    );
}
