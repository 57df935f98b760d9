//! Snapshot history and the per-site current snapshot.

use tracing::debug;

use crate::error::Result;
use crate::models::SnapshotRow;
use crate::pool::StateStore;

impl StateStore {
    /// The link list of the current snapshot for `site`, or `None` when the
    /// site has never been snapshotted.
    pub async fn current_links(&self, site: &str) -> Result<Option<Vec<String>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT links_json FROM current_snapshot WHERE site = ?")
                .bind(site)
                .fetch_optional(self.pool())
                .await?;

        match row {
            Some((links_json,)) => Ok(Some(serde_json::from_str(&links_json)?)),
            None => Ok(None),
        }
    }

    /// Commit one snapshot: append to history and replace the current
    /// snapshot for the site, in a single transaction. A failure rolls both
    /// writes back, leaving the prior state intact.
    pub async fn upsert_snapshot(&self, snapshot: &SnapshotRow) -> Result<()> {
        let links_json = serde_json::to_string(&snapshot.links)?;
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO snapshots(site, url, ts_ms, snapshot_hash, links_json)
            VALUES(?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.site)
        .bind(&snapshot.url)
        .bind(snapshot.ts_ms)
        .bind(&snapshot.snapshot_hash)
        .bind(&links_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO current_snapshot(site, url, ts_ms, snapshot_hash, links_json)
            VALUES(?, ?, ?, ?, ?)
            ON CONFLICT(site) DO UPDATE SET
              url=excluded.url,
              ts_ms=excluded.ts_ms,
              snapshot_hash=excluded.snapshot_hash,
              links_json=excluded.links_json
            "#,
        )
        .bind(&snapshot.site)
        .bind(&snapshot.url)
        .bind(snapshot.ts_ms)
        .bind(&snapshot.snapshot_hash)
        .bind(&links_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(site = %snapshot.site, hash = %snapshot.snapshot_hash, "snapshot committed");
        Ok(())
    }

    /// Delete every current snapshot row. Used by seeding; history is kept.
    pub async fn clear_current_snapshot(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM current_snapshot")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// History row count for a site, newest-first ordering is by `ts_ms`.
    pub async fn snapshot_history_count(&self, site: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots WHERE site = ?")
            .bind(site)
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }
}
