use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::DB_BUSY_TIMEOUT_SECONDS;
use crate::error::{AppError, AppResult};

const SCHEMA_SQL: &str = include_str!("../../migrations/schema.sql");

/// Columns added to `pipeline_state` after the first databases were created.
/// Older files get them through `ALTER TABLE` on open.
const PIPELINE_STATE_LATE_COLUMNS: &[&str] = &[
    "download_started_at",
    "download_completed_at",
    "download_notes",
    "split_started_at",
    "split_completed_at",
    "split_notes",
    "listobs_started_at",
    "listobs_completed_at",
    "listobs_notes",
    "selfcal_started_at",
    "selfcal_completed_at",
    "selfcal_notes",
    "preferred_datacolumn",
    "raw_data_spectral_remap",
];

/// Open (creating if needed) the on-disk state store and bring its schema up to date.
pub async fn open_pool(db_path: &Path) -> AppResult<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating database directory: {}", parent.display());
            fs::create_dir_all(parent)?;
        }
    }

    info!("Connecting to database at: {}", db_path.display());
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(DB_BUSY_TIMEOUT_SECONDS))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

    apply_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory store. The connection is never recycled, so
/// the database lives as long as the pool.
pub async fn open_in_memory_pool() -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to open in-memory database: {}", e)))?;

    apply_schema(&pool).await?;
    Ok(pool)
}

/// Apply the embedded schema and add any bookkeeping columns a legacy file lacks.
pub async fn apply_schema(pool: &SqlitePool) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    for statement in SCHEMA_SQL.split(';') {
        let sql: String = statement
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to apply schema: {}", e)))?;
    }

    tx.commit().await?;

    for column in PIPELINE_STATE_LATE_COLUMNS {
        if !has_column(pool, "pipeline_state", column).await? {
            info!("Adding missing column pipeline_state.{}", column);
            sqlx::query(&format!("ALTER TABLE pipeline_state ADD COLUMN {} TEXT", column))
                .execute(pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to add column {}: {}", column, e))
                })?;
        }
    }

    debug!("Database schema is up to date");
    Ok(())
}

/// Check if a column exists in a table using PRAGMA table_info.
pub async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> AppResult<bool> {
    let query = format!("PRAGMA table_info('{}')", table);
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to query table info for '{}': {}", table, e)))?;

    for row in rows {
        let name: String = row.try_get("name")?;
        if name.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }

    Ok(false)
}
