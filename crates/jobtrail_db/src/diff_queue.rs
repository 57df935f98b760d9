//! The diff queue: pending expansions of newly added URL sets.
//!
//! Enqueue is idempotent on `(site, diff_hash)`. Every status written here
//! is bound from [`QueueStatus`] and every transition is validated through
//! `QueueStatus::transition_to`, then performed as a guarded
//! compare-and-swap on the status column in one statement. Two racing
//! actors can never both win; the loser observes no row (or a `false`
//! result) and moves on.

use tracing::debug;

use crate::error::Result;
use crate::models::{DiffClaim, QueueStatus};
use crate::now_epoch_ms;
use crate::pool::StateStore;

/// IN_PROGRESS rows untouched for this long are considered abandoned.
pub const DEFAULT_REAP_TIMEOUT_MS: i64 = 10 * 60 * 1000;

/// Backoff applied when expansion fails.
pub const DEFAULT_DIFF_BACKOFF_MS: i64 = 30_000;

impl StateStore {
    /// Enqueue a diff for expansion.
    ///
    /// Returns `true` if a row was created, `false` if the same
    /// `(site, diff_hash)` already exists. An existing row is never updated.
    pub async fn enqueue_diff(
        &self,
        site: &str,
        diff_hash: &str,
        added_urls: &[String],
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO diff_queue(site, created_ts_ms, diff_hash, added_urls_json, status)
            VALUES(?, ?, ?, ?, ?)
            "#,
        )
        .bind(site)
        .bind(now_epoch_ms())
        .bind(diff_hash)
        .bind(serde_json::to_string(added_urls)?)
        .bind(QueueStatus::Pending)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Claim the oldest eligible PENDING diff for `owner`.
    ///
    /// The select-and-transition is a single guarded UPDATE; if another
    /// claimant wins the race the statement affects zero rows and `None` is
    /// returned.
    pub async fn claim_diff(&self, owner: &str) -> Result<Option<DiffClaim>> {
        let (from, to) = QueueStatus::Pending.transition_to(QueueStatus::InProgress)?;
        let now = now_epoch_ms();
        let claim: Option<DiffClaim> = sqlx::query_as(
            r#"
            UPDATE diff_queue
            SET status = ?,
                owner = ?,
                claimed_ts_ms = ?,
                updated_ts_ms = ?,
                attempts = attempts + 1
            WHERE id = (
                SELECT id FROM diff_queue
                WHERE status = ?
                  AND (backoff_until_ms IS NULL OR backoff_until_ms <= ?)
                ORDER BY created_ts_ms ASC
                LIMIT 1
            )
              AND status = ?
            RETURNING id, site, diff_hash, added_urls_json, status, attempts
            "#,
        )
        .bind(to)
        .bind(owner)
        .bind(now)
        .bind(now)
        .bind(from)
        .bind(now)
        .bind(from)
        .fetch_optional(self.pool())
        .await?;

        if let Some(claim) = &claim {
            debug!(id = claim.id, site = %claim.site, owner, "claimed diff");
        }
        Ok(claim)
    }

    /// Return abandoned IN_PROGRESS diffs to PENDING, clearing their owner.
    pub async fn reap_stuck_diffs(&self, timeout_ms: i64) -> Result<u64> {
        let (from, to) = QueueStatus::InProgress.transition_to(QueueStatus::Pending)?;
        let now = now_epoch_ms();
        let result = sqlx::query(
            r#"
            UPDATE diff_queue
            SET status = ?,
                owner = NULL,
                updated_ts_ms = ?,
                claimed_ts_ms = NULL
            WHERE status = ?
              AND claimed_ts_ms IS NOT NULL
              AND claimed_ts_ms <= ?
            "#,
        )
        .bind(to)
        .bind(now)
        .bind(from)
        .bind(now - timeout_ms)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Move a claimed diff to DONE.
    ///
    /// Returns `false` when the row was no longer IN_PROGRESS (reaped in
    /// the meantime); the caller observes the race outcome and moves on.
    pub async fn mark_diff_done(&self, diff_id: i64) -> Result<bool> {
        let (from, to) = QueueStatus::InProgress.transition_to(QueueStatus::Done)?;
        let result =
            sqlx::query("UPDATE diff_queue SET status = ?, updated_ts_ms = ? WHERE id = ? AND status = ?")
                .bind(to)
                .bind(now_epoch_ms())
                .bind(diff_id)
                .bind(from)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record an expansion failure and return the claimed row to PENDING
    /// with a backoff window. Returns `false` when the row was no longer
    /// IN_PROGRESS.
    pub async fn mark_diff_failed(&self, diff_id: i64, error: &str, backoff_ms: i64) -> Result<bool> {
        let (from, to) = QueueStatus::InProgress.transition_to(QueueStatus::Pending)?;
        let now = now_epoch_ms();
        let result = sqlx::query(
            r#"
            UPDATE diff_queue
            SET status = ?,
                last_error = ?,
                backoff_until_ms = ?,
                updated_ts_ms = ?
            WHERE id = ?
              AND status = ?
            "#,
        )
        .bind(to)
        .bind(error)
        .bind(now + backoff_ms)
        .bind(now)
        .bind(diff_id)
        .bind(from)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Administrative: drop the whole diff queue. Returns rows deleted.
    pub async fn clear_diff_queue(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM diff_queue")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn diff_queue_len(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM diff_queue")
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn enqueue_is_idempotent() {
        let store = StateStore::open_memory().await.unwrap();
        let added = urls(&["https://a/p1", "https://a/p2"]);

        assert!(store.enqueue_diff("A", "h1", &added).await.unwrap());
        assert!(!store.enqueue_diff("A", "h1", &added).await.unwrap());
        assert_eq!(store.diff_queue_len().await.unwrap(), 1);

        // Same hash under a different site is a distinct diff.
        assert!(store.enqueue_diff("B", "h1", &added).await.unwrap());
    }

    #[tokio::test]
    async fn claim_returns_oldest_pending() {
        let store = StateStore::open_memory().await.unwrap();
        store.enqueue_diff("A", "h1", &urls(&["https://a/1"])).await.unwrap();
        store.enqueue_diff("B", "h2", &urls(&["https://b/1"])).await.unwrap();

        let first = store.claim_diff("w1").await.unwrap().unwrap();
        assert_eq!(first.site, "A");
        assert_eq!(first.status, QueueStatus::InProgress);
        assert_eq!(first.attempts, 1);

        let second = store.claim_diff("w1").await.unwrap().unwrap();
        assert_eq!(second.site, "B");

        assert!(store.claim_diff("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_skips_backoff_window() {
        let store = StateStore::open_memory().await.unwrap();
        store.enqueue_diff("A", "h1", &urls(&["https://a/1"])).await.unwrap();

        let claim = store.claim_diff("w1").await.unwrap().unwrap();
        assert!(store.mark_diff_failed(claim.id, "boom", 60_000).await.unwrap());

        // Still backing off.
        assert!(store.claim_diff("w1").await.unwrap().is_none());

        // Expire the backoff and it becomes claimable again.
        sqlx::query("UPDATE diff_queue SET backoff_until_ms = 0 WHERE id = ?")
            .bind(claim.id)
            .execute(store.pool())
            .await
            .unwrap();
        let again = store.claim_diff("w2").await.unwrap().unwrap();
        assert_eq!(again.id, claim.id);
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn reap_returns_stale_claims_and_clears_owner() {
        let store = StateStore::open_memory().await.unwrap();
        store.enqueue_diff("A", "h1", &urls(&["https://a/1"])).await.unwrap();
        let claim = store.claim_diff("w1").await.unwrap().unwrap();

        // Fresh claim is not reaped.
        assert_eq!(store.reap_stuck_diffs(DEFAULT_REAP_TIMEOUT_MS).await.unwrap(), 0);

        // Age the claim past the threshold.
        sqlx::query("UPDATE diff_queue SET claimed_ts_ms = 1 WHERE id = ?")
            .bind(claim.id)
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.reap_stuck_diffs(DEFAULT_REAP_TIMEOUT_MS).await.unwrap(), 1);

        let row = sqlx::query("SELECT status, owner FROM diff_queue WHERE id = ?")
            .bind(claim.id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("status"), "PENDING");
        assert!(row.get::<Option<String>, _>("owner").is_none());

        // Round trip: reaped rows are claimable again.
        assert!(store.claim_diff("w2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn done_diffs_are_never_reclaimed() {
        let store = StateStore::open_memory().await.unwrap();
        store.enqueue_diff("A", "h1", &urls(&["https://a/1"])).await.unwrap();
        let claim = store.claim_diff("w1").await.unwrap().unwrap();
        assert!(store.mark_diff_done(claim.id).await.unwrap());
        assert!(store.claim_diff("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn marking_is_guarded_by_current_status() {
        let store = StateStore::open_memory().await.unwrap();
        store.enqueue_diff("A", "h1", &urls(&["https://a/1"])).await.unwrap();

        // A diff nobody holds cannot be marked done or failed.
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM diff_queue")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(!store.mark_diff_done(id).await.unwrap());
        assert!(!store.mark_diff_failed(id, "boom", 1_000).await.unwrap());

        // Claim, mark done; a second done observes the lost race.
        let claim = store.claim_diff("w1").await.unwrap().unwrap();
        assert!(store.mark_diff_done(claim.id).await.unwrap());
        assert!(!store.mark_diff_done(claim.id).await.unwrap());

        let row = sqlx::query("SELECT status, last_error FROM diff_queue WHERE id = ?")
            .bind(claim.id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("status"), "DONE");
        assert!(row.get::<Option<String>, _>("last_error").is_none());
    }

    #[tokio::test]
    async fn clear_diff_queue_reports_count() {
        let store = StateStore::open_memory().await.unwrap();
        store.enqueue_diff("A", "h1", &urls(&["https://a/1"])).await.unwrap();
        store.enqueue_diff("A", "h2", &urls(&["https://a/2"])).await.unwrap();
        assert_eq!(store.clear_diff_queue().await.unwrap(), 2);
        assert_eq!(store.diff_queue_len().await.unwrap(), 0);
    }
}
