//! TimeTree Service Binary
//!
//! Runs the time tree as a REST API service:
//! - Structured JSON logging
//! - A span per request tagged with the tree operation, root and request id
//! - Graceful shutdown handling
//! - Health check endpoints
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (unset: in-memory store)
//! - `TIMETREE_RESOLUTION`: Default resolution (default: day)
//! - `TIMETREE_TIME_ZONE`: Default IANA time zone (default: UTC)
//! - `TIMETREE_MAX_RANGE_UNITS`: Largest range a request may span (default: 100000)
//! - `PORT`: Service port (default: 8002)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin timetree_service --features service
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use axum::middleware;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use timetree::service::{create_router, metrics_middleware, request_span_middleware, ServiceState};
use timetree::{GraphStore, InMemoryGraphStore, PostgresGraphStore};

const DEFAULT_LOG_FILTER: &str = "timetree=info,timetree_service=info,tower_http=info,sqlx=warn";

/// Install the global subscriber. `LOG_FORMAT=pretty` selects the
/// human-readable layer, anything else JSON lines.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").map_or(true, |format| format != "pretty");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    // Span close events carry each request's busy/idle time.
    let pretty_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
    });
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(FmtSpan::CLOSE)
            .flatten_event(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty_layer)
        .with(json_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

async fn serve<S: GraphStore + 'static>(store: S, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let state = ServiceState::from_env(store);
    info!(
        default_resolution = %state.tree.config().default_resolution,
        default_time_zone = %state.tree.config().default_time_zone,
        max_range_units = state.max_range_units,
        "TimeTree defaults loaded"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_span_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "TimeTree Service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");
    info!(version = version, build_sha = build_sha, "Starting TimeTree Service");

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8002);
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => {
            info!("Connecting to PostgreSQL...");
            let connect_start = Instant::now();

            let store = match tokio::time::timeout(
                std::time::Duration::from_secs(30),
                PostgresGraphStore::from_env(),
            )
            .await
            {
                Ok(Ok(store)) => store,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    return Err(e.into());
                }
                Err(_) => {
                    tracing::error!("PostgreSQL connection timeout after 30s");
                    return Err("Database connection timeout".into());
                }
            };
            store.migrate().await?;

            info!(
                latency_ms = connect_start.elapsed().as_millis() as u64,
                "PostgreSQL connection established"
            );
            serve(store, addr).await?;
        }
        _ => {
            warn!("DATABASE_URL not set, using in-memory store. Data is lost on shutdown!");
            serve(InMemoryGraphStore::new(), addr).await?;
        }
    }

    info!("TimeTree Service shutdown complete");
    Ok(())
}
