//! Terminal inference results and digest bookkeeping.

use crate::error::Result;
use crate::models::{EmailCandidate, JobDetailUpdate, MIN_YEARS_THRESHOLD};
use crate::now_epoch_ms;
use crate::pool::StateStore;

impl StateStore {
    /// Write (or rewrite) the inference result for `(site, url)`.
    ///
    /// Re-inference replaces the extraction fields but never touches
    /// `emailed_ts_ms` or `digest_id`: a job that has gone out in a digest
    /// stays attributed to that digest.
    pub async fn upsert_job_details(&self, detail: &JobDetailUpdate) -> Result<()> {
        let now = now_epoch_ms();
        sqlx::query(
            r#"
            INSERT INTO job_details(
              site, url, job_title, min_years, include_job, exclude_reason, raw_json,
              created_ts_ms, updated_ts_ms
            )
            VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(site, url) DO UPDATE SET
              job_title=excluded.job_title,
              min_years=excluded.min_years,
              include_job=excluded.include_job,
              exclude_reason=excluded.exclude_reason,
              raw_json=excluded.raw_json,
              updated_ts_ms=excluded.updated_ts_ms
            "#,
        )
        .bind(&detail.site)
        .bind(&detail.url)
        .bind(&detail.job_title)
        .bind(detail.min_years)
        .bind(detail.include_job as i64)
        .bind(&detail.exclude_reason)
        .bind(serde_json::to_string(&detail.raw_json)?)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Rows under the experience threshold that have never been emailed,
    /// most recent first.
    pub async fn list_jobs_ready_for_email(&self, limit: i64) -> Result<Vec<EmailCandidate>> {
        let rows: Vec<EmailCandidate> = sqlx::query_as(
            r#"
            SELECT site, url, COALESCE(job_title, '') AS job_title, min_years, created_ts_ms
            FROM job_details
            WHERE min_years < ?
              AND emailed_ts_ms IS NULL
            ORDER BY created_ts_ms DESC
            LIMIT ?
            "#,
        )
        .bind(MIN_YEARS_THRESHOLD)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Stamp `urls` as emailed under `digest_id`.
    ///
    /// The `emailed_ts_ms IS NULL` guard means racing digest runs partition
    /// the candidate set: every row is stamped by exactly one digest.
    /// Returns how many rows this call stamped.
    pub async fn mark_jobs_emailed(&self, urls: &[String], digest_id: &str) -> Result<u64> {
        if urls.is_empty() {
            return Ok(0);
        }
        let now = now_epoch_ms();
        let mut marked = 0u64;
        for url in urls {
            let result = sqlx::query(
                r#"
                UPDATE job_details
                SET emailed_ts_ms = ?,
                    digest_id = ?
                WHERE url = ? AND emailed_ts_ms IS NULL
                "#,
            )
            .bind(now)
            .bind(digest_id)
            .bind(url)
            .execute(self.pool())
            .await?;
            marked += result.rows_affected();
        }
        Ok(marked)
    }

    /// Every emailed row, oldest first. Feeds the audit CSV rebuild.
    pub async fn list_emailed_jobs(&self) -> Result<Vec<EmailedJob>> {
        let rows: Vec<EmailedJob> = sqlx::query_as(
            r#"
            SELECT site, url, COALESCE(job_title, '') AS job_title, min_years,
                   emailed_ts_ms, COALESCE(digest_id, '') AS digest_id
            FROM job_details
            WHERE emailed_ts_ms IS NOT NULL
            ORDER BY emailed_ts_ms ASC, id ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

/// A row that has gone out in some digest.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmailedJob {
    pub site: String,
    pub url: String,
    pub job_title: String,
    pub min_years: i64,
    pub emailed_ts_ms: i64,
    pub digest_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    fn detail(site: &str, url: &str, min_years: i64) -> JobDetailUpdate {
        let include_job = min_years < MIN_YEARS_THRESHOLD;
        JobDetailUpdate {
            site: site.to_string(),
            url: url.to_string(),
            job_title: format!("Engineer at {site}"),
            min_years,
            include_job,
            exclude_reason: (!include_job).then(|| "min_years_gte_4".to_string()),
            raw_json: serde_json::json!({"job_title": "Engineer", "min_years": min_years}),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_extraction_fields() {
        let store = StateStore::open_memory().await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/1", 2)).await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/1", 5)).await.unwrap();

        let row = sqlx::query("SELECT min_years, include_job, exclude_reason FROM job_details")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("min_years"), 5);
        assert_eq!(row.get::<i64, _>("include_job"), 0);
        assert_eq!(row.get::<String, _>("exclude_reason"), "min_years_gte_4");

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_details")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn reinference_preserves_digest_attribution() {
        let store = StateStore::open_memory().await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/1", 2)).await.unwrap();
        store
            .mark_jobs_emailed(&["https://a/1".to_string()], "digest-1")
            .await
            .unwrap();

        store.upsert_job_details(&detail("A", "https://a/1", 3)).await.unwrap();

        let row = sqlx::query("SELECT emailed_ts_ms, digest_id FROM job_details")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(row.get::<Option<i64>, _>("emailed_ts_ms").is_some());
        assert_eq!(row.get::<String, _>("digest_id"), "digest-1");
    }

    #[tokio::test]
    async fn selection_applies_threshold_and_email_guard() {
        let store = StateStore::open_memory().await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/1", 0)).await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/2", 3)).await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/3", 4)).await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/4", 7)).await.unwrap();

        let ready = store.list_jobs_ready_for_email(200).await.unwrap();
        let urls: Vec<&str> = ready.iter().map(|j| j.url.as_str()).collect();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"https://a/1"));
        assert!(urls.contains(&"https://a/2"));
    }

    #[tokio::test]
    async fn selection_is_monotonic_across_digests() {
        let store = StateStore::open_memory().await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/1", 1)).await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/2", 2)).await.unwrap();

        let first = store.list_jobs_ready_for_email(200).await.unwrap();
        let urls: Vec<String> = first.iter().map(|j| j.url.clone()).collect();
        assert_eq!(store.mark_jobs_emailed(&urls, "d1").await.unwrap(), 2);

        // Nothing previously marked is ever selected again.
        assert!(store.list_jobs_ready_for_email(200).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn double_marking_stamps_each_row_once() {
        let store = StateStore::open_memory().await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/1", 1)).await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/2", 1)).await.unwrap();
        let urls = vec!["https://a/1".to_string(), "https://a/2".to_string()];

        let first = store.mark_jobs_emailed(&urls, "d1").await.unwrap();
        let second = store.mark_jobs_emailed(&urls, "d2").await.unwrap();
        assert_eq!(first + second, 2);
        assert_eq!(second, 0);

        let digests: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT digest_id FROM job_details")
                .fetch_all(store.pool())
                .await
                .unwrap();
        assert_eq!(digests, vec!["d1".to_string()]);
    }

    #[tokio::test]
    async fn selection_respects_limit_newest_first() {
        let store = StateStore::open_memory().await.unwrap();
        for i in 0..5 {
            store
                .upsert_job_details(&detail("A", &format!("https://a/{i}"), 1))
                .await
                .unwrap();
            sqlx::query("UPDATE job_details SET created_ts_ms = ? WHERE url = ?")
                .bind(i as i64)
                .bind(format!("https://a/{i}"))
                .execute(store.pool())
                .await
                .unwrap();
        }
        let ready = store.list_jobs_ready_for_email(2).await.unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].url, "https://a/4");
        assert_eq!(ready[1].url, "https://a/3");
    }

    #[tokio::test]
    async fn emailed_listing_orders_by_emailed_ts() {
        let store = StateStore::open_memory().await.unwrap();
        store.upsert_job_details(&detail("A", "https://a/1", 1)).await.unwrap();
        store
            .mark_jobs_emailed(&["https://a/1".to_string()], "d1")
            .await
            .unwrap();
        store.upsert_job_details(&detail("B", "https://b/1", 2)).await.unwrap();
        store
            .mark_jobs_emailed(&["https://b/1".to_string()], "d2")
            .await
            .unwrap();

        let emailed = store.list_emailed_jobs().await.unwrap();
        assert_eq!(emailed.len(), 2);
        assert_eq!(emailed[0].digest_id, "d1");
        assert_eq!(emailed[1].digest_id, "d2");
    }
}
