//! SQLite-backed persistence
//!
//! Holds the sync links, the job state machine and the read-only mirror
//! tables (customers, products, salespersons) maintained by the
//! master-data sync jobs outside this engine.

pub mod jobs;
pub mod links;
pub mod refs;

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use jobs::{Job, JobStatus};
pub use links::Link;

/// Shared handle to the local database. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database {}", path.display()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory database")?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("failed to initialize schema")?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    period TEXT NOT NULL,
    external_key TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (period, external_key)
);

CREATE TABLE IF NOT EXISTS sync_jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    processed_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    log TEXT NOT NULL DEFAULT '',
    params_json TEXT NOT NULL,
    result_json TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS customers (
    code TEXT PRIMARY KEY,
    remote_id TEXT NOT NULL,
    name TEXT
);

CREATE TABLE IF NOT EXISTS products (
    code TEXT PRIMARY KEY,
    remote_id TEXT NOT NULL,
    name TEXT
);

CREATE TABLE IF NOT EXISTS salespersons (
    code TEXT PRIMARY KEY,
    remote_id TEXT NOT NULL,
    name TEXT
);
"#;
