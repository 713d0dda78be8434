//! # Local Cache
//!
//! SQLite store holding the last known full state of each workspace replica,
//! so a client can bootstrap offline and keep edits across restarts.
//!
//! ## Schema
//!
//! ```text
//! replica_snapshots
//!   workspace_id TEXT PRIMARY KEY
//!   state        BLOB      -- full encoded replica state
//!   updated_at   TEXT      -- RFC 3339
//! ```

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

/// Result type for cache operations
pub type Result<T> = sqlx::Result<T>;

/// Durable client-side replica cache
#[derive(Debug, Clone)]
pub struct LocalCache {
    pool: SqlitePool,
}

impl LocalCache {
    /// Open or create the cache file at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&database_url).await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

        let cache = Self { pool };
        cache.init_schema().await?;
        Ok(cache)
    }

    /// Cache that lives only as long as this value
    pub async fn open_in_memory() -> Result<Self> {
        // One connection that never expires, or the database goes with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let cache = Self { pool };
        cache.init_schema().await?;
        Ok(cache)
    }

    /// Platform data directory location for the cache file
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        path.push("xfcanvas");
        path.push("replicas.db");
        path
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS replica_snapshots (
                workspace_id TEXT PRIMARY KEY,
                state BLOB NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Last stored state for a workspace
    pub async fn load(&self, workspace_id: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT state FROM replica_snapshots WHERE workspace_id = ?")
                .bind(workspace_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(state,)| state))
    }

    /// Replace the stored state for a workspace
    pub async fn store(&self, workspace_id: &str, state: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO replica_snapshots (workspace_id, state, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(workspace_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at",
        )
        .bind(workspace_id)
        .bind(state)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Forget a workspace; returns whether anything was stored
    pub async fn remove(&self, workspace_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM replica_snapshots WHERE workspace_id = ?")
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn workspace_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT workspace_id FROM replica_snapshots ORDER BY workspace_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
