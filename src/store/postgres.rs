//! PostgreSQL snapshot mirror for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

use super::{SnapshotError, SnapshotRecord, SnapshotStore};
use crate::types::RequestId;

/// DDL for the snapshot table. Applied by the deployment, not by the core.
pub const SNAPSHOT_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queue_snapshot (
    request_id          TEXT PRIMARY KEY,
    vulnerability_score SMALLINT NOT NULL,
    urgency_score       SMALLINT NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL,
    priority_score      DOUBLE PRECISION NOT NULL,
    payload             JSONB NOT NULL DEFAULT 'null'::jsonb
);
CREATE INDEX IF NOT EXISTS queue_snapshot_priority_idx
    ON queue_snapshot (priority_score DESC);
"#;

/// Configuration for the PostgreSQL connection pool.
///
/// Timeouts are aggressive: the mirror is best-effort, so failing fast is
/// preferable to stalling a snapshot task on a dead backend.
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
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/relief".to_string()),
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// PostgreSQL snapshot mirror.
///
/// Uses connection pooling; every operation maps backend errors to
/// [`SnapshotError::Unavailable`] so callers degrade instead of failing.
pub struct PostgresSnapshotStore {
    pool: PgPool,
}

impl PostgresSnapshotStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, SnapshotError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(unavailable)?;

        Ok(Self { pool })
    }

    /// Create a store from environment configuration.
    pub async fn from_env() -> Result<Self, SnapshotError> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(err: sqlx::Error) -> SnapshotError {
    SnapshotError::Unavailable(err.to_string())
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn clear(&self) -> Result<(), SnapshotError> {
        sqlx::query("DELETE FROM queue_snapshot")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn write_all(&self, records: &[SnapshotRecord]) -> Result<(), SnapshotError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        for record in records {
            sqlx::query(
                "INSERT INTO queue_snapshot \
                 (request_id, vulnerability_score, urgency_score, created_at, priority_score, payload) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (request_id) DO UPDATE SET \
                 priority_score = EXCLUDED.priority_score, payload = EXCLUDED.payload",
            )
            .bind(record.id.as_str())
            .bind(i16::from(record.vulnerability_score))
            .bind(i16::from(record.urgency_score))
            .bind(record.created_at)
            .bind(record.priority_score)
            .bind(&record.payload)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn read_all_descending(&self) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        let rows = sqlx::query(
            "SELECT request_id, vulnerability_score, urgency_score, created_at, priority_score, payload \
             FROM queue_snapshot ORDER BY priority_score DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(SnapshotRecord {
                id: RequestId::new(row.try_get::<String, _>("request_id").map_err(unavailable)?),
                vulnerability_score: row
                    .try_get::<i16, _>("vulnerability_score")
                    .map_err(unavailable)? as u8,
                urgency_score: row.try_get::<i16, _>("urgency_score").map_err(unavailable)? as u8,
                created_at: row.try_get("created_at").map_err(unavailable)?,
                priority_score: row.try_get("priority_score").map_err(unavailable)?,
                payload: row.try_get("payload").map_err(unavailable)?,
            });
        }

        Ok(records)
    }
}
