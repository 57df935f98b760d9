//! Store handle creation.
//!
//! Uses a concrete `SqlitePool` which allows full support for
//! `#[derive(FromRow)]` with custom types like the status enum. Pools are
//! cheap to clone; each pipeline stage opens its own and the store's
//! busy timeout arbitrates cross-stage writes.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::debug;

use crate::error::Result;
use crate::schema;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the jobtrail state database.
#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open (creating if missing) the state database at `path`, apply
    /// connection pragmas, and bootstrap or migrate the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        schema::bootstrap(&pool).await?;
        debug!(path = %path.display(), "state store opened");
        Ok(Self { pool })
    }

    /// In-memory store for tests.
    ///
    /// Capped at one connection: every sqlite `:memory:` connection is its
    /// own database.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .pragma("temp_store", "MEMORY");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        schema::bootstrap(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for ad-hoc queries and tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, releasing any file locks.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
