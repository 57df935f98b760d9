//! Schema bootstrap and additive migration.
//!
//! All DDL is idempotent (`CREATE ... IF NOT EXISTS`); existing
//! installations gain newer columns through `ensure_column`, which inspects
//! `PRAGMA table_info`. There is no destructive migration path.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::info;

use crate::error::Result;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  site TEXT NOT NULL,
  url TEXT NOT NULL,
  ts_ms INTEGER NOT NULL,
  snapshot_hash TEXT NOT NULL,
  links_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_site_ts
  ON snapshots(site, ts_ms);

CREATE TABLE IF NOT EXISTS current_snapshot (
  site TEXT PRIMARY KEY,
  url TEXT NOT NULL,
  ts_ms INTEGER NOT NULL,
  snapshot_hash TEXT NOT NULL,
  links_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS diff_queue (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  site TEXT NOT NULL,
  created_ts_ms INTEGER NOT NULL,
  diff_hash TEXT NOT NULL,
  added_urls_json TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'PENDING',
  attempts INTEGER NOT NULL DEFAULT 0,
  last_error TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_diff_queue_site_hash
  ON diff_queue(site, diff_hash);
CREATE INDEX IF NOT EXISTS idx_diff_queue_status_created
  ON diff_queue(status, created_ts_ms);

CREATE TABLE IF NOT EXISTS job_tasks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  site TEXT NOT NULL,
  url TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'PENDING',
  created_ts_ms INTEGER NOT NULL,
  updated_ts_ms INTEGER NOT NULL,
  owner TEXT,
  attempts INTEGER NOT NULL DEFAULT 0,
  last_error TEXT,
  backoff_until_ms INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_job_tasks_site_url
  ON job_tasks(site, url);
CREATE INDEX IF NOT EXISTS idx_job_tasks_status_created
  ON job_tasks(status, created_ts_ms);

CREATE TABLE IF NOT EXISTS job_details (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  site TEXT NOT NULL,
  url TEXT NOT NULL,
  job_title TEXT,
  min_years INTEGER NOT NULL DEFAULT 0,
  include_job INTEGER NOT NULL DEFAULT 1,
  exclude_reason TEXT,
  raw_json TEXT,
  created_ts_ms INTEGER NOT NULL,
  updated_ts_ms INTEGER NOT NULL,
  emailed_ts_ms INTEGER,
  digest_id TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_job_details_site_url
  ON job_details(site, url);
CREATE INDEX IF NOT EXISTS idx_job_details_email
  ON job_details(include_job, emailed_ts_ms, created_ts_ms);
"#;

/// Create missing tables and indexes, then add columns absent from older
/// installations.
pub(crate) async fn bootstrap(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(CREATE_TABLES).execute(pool).await?;

    // Claim/lease columns arrived after the first diff_queue schema.
    ensure_column(pool, "diff_queue", "owner", "TEXT").await?;
    ensure_column(pool, "diff_queue", "claimed_ts_ms", "INTEGER").await?;
    ensure_column(pool, "diff_queue", "updated_ts_ms", "INTEGER").await?;
    ensure_column(pool, "diff_queue", "backoff_until_ms", "INTEGER").await?;

    Ok(())
}

async fn ensure_column(pool: &SqlitePool, table: &str, column: &str, col_type: &str) -> Result<()> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table});"))
        .fetch_all(pool)
        .await?;

    let present = rows
        .iter()
        .any(|row| row.get::<String, _>("name") == column);
    if present {
        return Ok(());
    }

    sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {col_type};"))
        .execute(pool)
        .await?;
    info!(table, column, "added missing column");
    Ok(())
}
