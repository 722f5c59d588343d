//! PostgreSQL graph store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//!
//! ## Schema
//!
//! ```text
//! timetree_nodes      (id BIGSERIAL, labels TEXT[], properties JSONB)
//! timetree_edges      (from_id, rel, to_id)            primary key on all three
//! timetree_singletons (label, node_id)                 one row per singleton label
//! ```
//!
//! Transactions run at SERIALIZABLE isolation. A conflicting writer fails
//! with a serialization error, which is surfaced to the caller unchanged.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row};
use std::time::Duration;

use super::{GraphStore, GraphTransaction};
use crate::types::{NodeId, RelType};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS timetree_nodes (
    id          BIGSERIAL PRIMARY KEY,
    labels      TEXT[] NOT NULL,
    properties  JSONB NOT NULL DEFAULT '{}'::jsonb
);
CREATE INDEX IF NOT EXISTS timetree_nodes_labels_idx ON timetree_nodes USING GIN (labels);

CREATE TABLE IF NOT EXISTS timetree_edges (
    from_id  BIGINT NOT NULL REFERENCES timetree_nodes(id) ON DELETE CASCADE,
    rel      TEXT NOT NULL,
    to_id    BIGINT NOT NULL REFERENCES timetree_nodes(id) ON DELETE CASCADE,
    PRIMARY KEY (from_id, rel, to_id)
);
CREATE INDEX IF NOT EXISTS timetree_edges_incoming_idx ON timetree_edges (to_id, rel);

CREATE TABLE IF NOT EXISTS timetree_singletons (
    label    TEXT PRIMARY KEY,
    node_id  BIGINT NOT NULL REFERENCES timetree_nodes(id) ON DELETE CASCADE
);
"#;

/// SQLSTATE for `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/timetree".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// PostgreSQL graph store.
#[derive(Debug, Clone)]
pub struct PostgresGraphStore {
    pool: PgPool,
}

impl PostgresGraphStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, PostgresError> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, PostgresError> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), PostgresError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("TimeTree schema ready");
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Node does not exist.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}

impl PostgresError {
    /// Whether the transaction lost a serialization conflict and may be
    /// retried by the caller.
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => db.code().as_deref() == Some(SERIALIZATION_FAILURE),
            _ => false,
        }
    }
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    type Error = PostgresError;
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction, PostgresError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(PostgresTransaction { tx })
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

/// One SERIALIZABLE transaction. Dropping it rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn db_id(node: NodeId) -> i64 {
    node.as_u64() as i64
}

fn node_id(id: i64) -> NodeId {
    NodeId::new(id as u64)
}

impl PostgresTransaction {
    async fn ids(&mut self, sql: &str, node: NodeId, rel: RelType) -> Result<Vec<NodeId>, PostgresError> {
        let rows = sqlx::query(sql)
            .bind(db_id(node))
            .bind(rel.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>(0).map(node_id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }
}

#[async_trait]
impl GraphTransaction for PostgresTransaction {
    type Error = PostgresError;

    async fn create_node(&mut self, labels: &[&str]) -> Result<NodeId, PostgresError> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let id: i64 = sqlx::query_scalar("INSERT INTO timetree_nodes (labels) VALUES ($1) RETURNING id")
            .bind(&labels)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(node_id(id))
    }

    async fn node_exists(&mut self, node: NodeId) -> Result<bool, PostgresError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM timetree_nodes WHERE id = $1)")
            .bind(db_id(node))
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn labels(&mut self, node: NodeId) -> Result<Vec<String>, PostgresError> {
        let labels: Option<Vec<String>> = sqlx::query_scalar("SELECT labels FROM timetree_nodes WHERE id = $1")
            .bind(db_id(node))
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(labels.unwrap_or_default())
    }

    async fn nodes_with_label(&mut self, label: &str) -> Result<Vec<NodeId>, PostgresError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM timetree_nodes WHERE $1 = ANY(labels) ORDER BY id")
            .bind(label)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(ids.into_iter().map(node_id).collect())
    }

    async fn get_or_create_singleton(&mut self, label: &str) -> Result<NodeId, PostgresError> {
        // Held until the transaction ends; serializes first use across sessions
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(label)
            .execute(&mut *self.tx)
            .await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT node_id FROM timetree_singletons WHERE label = $1")
            .bind(label)
            .fetch_optional(&mut *self.tx)
            .await?;
        if let Some(id) = existing {
            return Ok(node_id(id));
        }

        let id = self.create_node(&[label]).await?;
        sqlx::query("INSERT INTO timetree_singletons (label, node_id) VALUES ($1, $2)")
            .bind(label)
            .bind(db_id(id))
            .execute(&mut *self.tx)
            .await?;
        tracing::debug!(node = %id, label, "Singleton created");
        Ok(id)
    }

    async fn set_property(&mut self, node: NodeId, key: &str, value: Value) -> Result<(), PostgresError> {
        let result = sqlx::query(
            "UPDATE timetree_nodes SET properties = properties || jsonb_build_object($2::text, $3::jsonb) WHERE id = $1",
        )
        .bind(db_id(node))
        .bind(key)
        .bind(value)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(PostgresError::NodeNotFound(node));
        }
        Ok(())
    }

    async fn get_property(&mut self, node: NodeId, key: &str) -> Result<Option<Value>, PostgresError> {
        let value: Option<Option<Value>> = sqlx::query_scalar("SELECT properties -> $2 FROM timetree_nodes WHERE id = $1")
            .bind(db_id(node))
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(value.flatten())
    }

    async fn create_edge(&mut self, from: NodeId, to: NodeId, rel: RelType) -> Result<(), PostgresError> {
        sqlx::query("INSERT INTO timetree_edges (from_id, rel, to_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING")
            .bind(db_id(from))
            .bind(rel.as_str())
            .bind(db_id(to))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn replace_edge(&mut self, from: NodeId, rel: RelType, to: NodeId) -> Result<(), PostgresError> {
        sqlx::query("DELETE FROM timetree_edges WHERE from_id = $1 AND rel = $2 AND to_id <> $3")
            .bind(db_id(from))
            .bind(rel.as_str())
            .bind(db_id(to))
            .execute(&mut *self.tx)
            .await?;
        self.create_edge(from, to, rel).await
    }

    async fn delete_edge(&mut self, from: NodeId, rel: RelType, to: NodeId) -> Result<(), PostgresError> {
        sqlx::query("DELETE FROM timetree_edges WHERE from_id = $1 AND rel = $2 AND to_id = $3")
            .bind(db_id(from))
            .bind(rel.as_str())
            .bind(db_id(to))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn outgoing(&mut self, node: NodeId, rel: RelType) -> Result<Vec<NodeId>, PostgresError> {
        self.ids(
            "SELECT to_id FROM timetree_edges WHERE from_id = $1 AND rel = $2 ORDER BY to_id",
            node,
            rel,
        )
        .await
    }

    async fn incoming(&mut self, node: NodeId, rel: RelType) -> Result<Vec<NodeId>, PostgresError> {
        self.ids(
            "SELECT from_id FROM timetree_edges WHERE to_id = $1 AND rel = $2 ORDER BY from_id",
            node,
            rel,
        )
        .await
    }

    async fn commit(self) -> Result<(), PostgresError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), PostgresError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
