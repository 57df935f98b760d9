//! The job task queue: pending per-URL inference work.
//!
//! Tasks are deduplicated at the pipeline boundary by the unique
//! `(site, url)` index, so the same URL arriving from separate diffs is
//! inserted once. Statuses are bound from [`QueueStatus`] and transitions
//! validated through `QueueStatus::transition_to` before reaching SQL.
//! FAILED tasks re-enter the claim pool once their backoff elapses; there
//! is no hard retry cap.

use tracing::debug;

use crate::error::Result;
use crate::models::{QueueStatus, TaskClaim};
use crate::now_epoch_ms;
use crate::pool::StateStore;

/// Backoff applied when a task fails.
pub const DEFAULT_TASK_BACKOFF_MS: i64 = 30_000;

impl StateStore {
    /// Insert tasks for `urls`, ignoring any `(site, url)` already queued.
    /// Returns how many rows were actually created.
    pub async fn add_job_tasks(&self, site: &str, urls: &[String]) -> Result<u64> {
        if urls.is_empty() {
            return Ok(0);
        }
        let now = now_epoch_ms();
        let mut inserted = 0u64;
        for url in urls {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO job_tasks(site, url, status, created_ts_ms, updated_ts_ms)
                VALUES(?, ?, ?, ?, ?)
                "#,
            )
            .bind(site)
            .bind(url)
            .bind(QueueStatus::Pending)
            .bind(now)
            .bind(now)
            .execute(self.pool())
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Claim the oldest eligible PENDING or FAILED task for `owner`.
    pub async fn claim_job_task(&self, owner: &str) -> Result<Option<TaskClaim>> {
        let (pending, to) = QueueStatus::Pending.transition_to(QueueStatus::InProgress)?;
        let (failed, _) = QueueStatus::Failed.transition_to(QueueStatus::InProgress)?;
        let now = now_epoch_ms();
        let claim: Option<TaskClaim> = sqlx::query_as(
            r#"
            UPDATE job_tasks
            SET status = ?,
                owner = ?,
                updated_ts_ms = ?,
                attempts = attempts + 1
            WHERE id = (
                SELECT id FROM job_tasks
                WHERE status IN (?, ?)
                  AND (backoff_until_ms IS NULL OR backoff_until_ms <= ?)
                ORDER BY created_ts_ms ASC
                LIMIT 1
            )
              AND status IN (?, ?)
            RETURNING id, site, url, status, attempts
            "#,
        )
        .bind(to)
        .bind(owner)
        .bind(now)
        .bind(pending)
        .bind(failed)
        .bind(now)
        .bind(pending)
        .bind(failed)
        .fetch_optional(self.pool())
        .await?;

        if let Some(claim) = &claim {
            debug!(id = claim.id, site = %claim.site, owner, "claimed job task");
        }
        Ok(claim)
    }

    /// Return abandoned IN_PROGRESS tasks to PENDING, clearing their owner.
    pub async fn reap_stuck_job_tasks(&self, timeout_ms: i64) -> Result<u64> {
        let (from, to) = QueueStatus::InProgress.transition_to(QueueStatus::Pending)?;
        let now = now_epoch_ms();
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = ?,
                owner = NULL,
                updated_ts_ms = ?
            WHERE status = ?
              AND updated_ts_ms <= ?
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

    /// Move a claimed task to DONE.
    ///
    /// Returns `false` when the row was no longer IN_PROGRESS (reaped in
    /// the meantime); the caller observes the race outcome and moves on.
    pub async fn complete_job_task(&self, url: &str) -> Result<bool> {
        let (from, to) = QueueStatus::InProgress.transition_to(QueueStatus::Done)?;
        let result =
            sqlx::query("UPDATE job_tasks SET status = ?, updated_ts_ms = ? WHERE url = ? AND status = ?")
                .bind(to)
                .bind(now_epoch_ms())
                .bind(url)
                .bind(from)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record a task failure with a backoff window; the task becomes
    /// claimable again once the window elapses. Returns `false` when the
    /// row was no longer IN_PROGRESS.
    pub async fn fail_job_task(&self, url: &str, error: &str, backoff_ms: i64) -> Result<bool> {
        let (from, to) = QueueStatus::InProgress.transition_to(QueueStatus::Failed)?;
        let now = now_epoch_ms();
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = ?,
                last_error = ?,
                backoff_until_ms = ?,
                updated_ts_ms = ?
            WHERE url = ?
              AND status = ?
            "#,
        )
        .bind(to)
        .bind(error)
        .bind(now + backoff_ms)
        .bind(now)
        .bind(url)
        .bind(from)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn job_task_count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_tasks")
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }
}
