//! Worker loop and pipeline behavior against stub pipeline stages.
//!
//! The pipeline contract is `<node-bin> <script> <url>` piped into
//! `<python-bin> <script>`; the stubs use `sh` for both binaries so the
//! scripts are plain shell.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use jobtrail_db::StateStore;
use jobtrail_worker::{run_extraction, run_worker, PipelineConfig, PipelineError, WorkerOptions};

fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

/// Stage A echoes the URL into the page text; stage B keys off it.
fn stub_pipeline(dir: &Path, timeout: Duration) -> PipelineConfig {
    let stage_a = write_script(
        dir,
        "page_text.sh",
        r#"printf '{"job_title":"Listing","text":"%s"}' "$1"
"#,
    );
    let stage_b = write_script(
        dir,
        "extract.sh",
        r#"input=$(cat)
case "$input" in
  *senior*) printf '{"job_title":"Senior Engineer","min_years":5}' ;;
  *) printf '{"job_title":"Engineer","min_years":2}' ;;
esac
"#,
    );
    PipelineConfig {
        node_bin: "sh".to_string(),
        puppeteer_script: stage_a,
        python_bin: "sh".to_string(),
        extractor_script: stage_b,
        timeout,
    }
}

#[tokio::test]
async fn pipeline_parses_stage_b_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let config = stub_pipeline(dir.path(), Duration::from_secs(10));

    let value = run_extraction(&config, "https://a.example/jobs/1")
        .await
        .unwrap();
    assert_eq!(value["job_title"], "Engineer");
    assert_eq!(value["min_years"], 2);
}

#[tokio::test]
async fn stage_a_failure_is_reported_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = stub_pipeline(dir.path(), Duration::from_secs(10));
    config.puppeteer_script = write_script(
        dir.path(),
        "broken_a.sh",
        "echo 'browser crashed' >&2; exit 7\n",
    );

    let err = run_extraction(&config, "https://a.example/jobs/1")
        .await
        .unwrap_err();
    match err {
        PipelineError::StageFailed { stage, code, stderr_preview } => {
            assert_eq!(stage, "puppeteer");
            assert_eq!(code, Some(7));
            assert!(stderr_preview.contains("browser crashed"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn stage_b_failure_carries_stderr_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = stub_pipeline(dir.path(), Duration::from_secs(10));
    config.extractor_script = write_script(
        dir.path(),
        "broken_b.sh",
        "cat >/dev/null; echo 'no api key' >&2; exit 2\n",
    );

    let err = run_extraction(&config, "https://a.example/jobs/1")
        .await
        .unwrap_err();
    match err {
        PipelineError::StageFailed { stage, code, stderr_preview } => {
            assert_eq!(stage, "extract_experience");
            assert_eq!(code, Some(2));
            assert!(stderr_preview.contains("no api key"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn timeout_tears_down_both_stages() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = stub_pipeline(dir.path(), Duration::from_millis(300));
    config.puppeteer_script = write_script(dir.path(), "hang.sh", "sleep 30\n");
    config.extractor_script = write_script(dir.path(), "drain.sh", "cat >/dev/null\n");

    let started = Instant::now();
    let err = run_extraction(&config, "https://a.example/jobs/1")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Timeout(_)));
    // Well under the 30s the hung stage wanted.
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn invalid_stage_b_json_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = stub_pipeline(dir.path(), Duration::from_secs(10));
    config.extractor_script = write_script(
        dir.path(),
        "garbage.sh",
        "cat >/dev/null; printf 'not json at all'\n",
    );

    let err = run_extraction(&config, "https://a.example/jobs/1")
        .await
        .unwrap_err();
    match err {
        PipelineError::InvalidJson { raw_preview, .. } => {
            assert!(raw_preview.contains("not json"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn worker_drains_diff_into_details() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.sqlite3");

    {
        let store = StateStore::open(&db_path).await.unwrap();
        store
            .enqueue_diff(
                "A",
                "h1",
                &[
                    "https://a.example/jobs/junior-1".to_string(),
                    "https://a.example/jobs/senior-2".to_string(),
                ],
            )
            .await
            .unwrap();
        store.close().await;
    }

    let options = WorkerOptions {
        db_path: db_path.clone(),
        pipeline: stub_pipeline(dir.path(), Duration::from_secs(10)),
        poll_sleep: Duration::from_millis(20),
        max_jobs_per_run: 2,
    };
    let processed = run_worker(&options).await.unwrap();
    assert_eq!(processed, 2);

    let store = StateStore::open(&db_path).await.unwrap();

    // Both tasks are terminal.
    let open: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_tasks WHERE status != 'DONE'")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(open, 0);

    // The senior listing is excluded; only the junior one is mailable.
    let ready = store.list_jobs_ready_for_email(200).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].url, "https://a.example/jobs/junior-1");
    assert_eq!(ready[0].min_years, 2);

    let (include, reason): (i64, Option<String>) = sqlx::query_as(
        "SELECT include_job, exclude_reason FROM job_details WHERE url LIKE '%senior%'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(include, 0);
    assert_eq!(reason.as_deref(), Some("min_years_gte_4"));
}

#[tokio::test]
async fn worker_completes_blocked_url_without_detail() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.sqlite3");

    {
        let store = StateStore::open(&db_path).await.unwrap();
        // A task that predates the blocklist, plus a normal one.
        store
            .add_job_tasks("A", &["https://errors.edgesuite.net/landing".to_string()])
            .await
            .unwrap();
        store
            .add_job_tasks("A", &["https://a.example/jobs/junior-1".to_string()])
            .await
            .unwrap();
        sqlx::query("UPDATE job_tasks SET created_ts_ms = 1 WHERE url LIKE '%edgesuite%'")
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE job_tasks SET created_ts_ms = 2 WHERE url LIKE '%junior%'")
            .execute(store.pool())
            .await
            .unwrap();
        store.close().await;
    }

    let options = WorkerOptions {
        db_path: db_path.clone(),
        pipeline: stub_pipeline(dir.path(), Duration::from_secs(10)),
        poll_sleep: Duration::from_millis(20),
        max_jobs_per_run: 1,
    };
    // The blocked task is consumed first but does not count as processed.
    let processed = run_worker(&options).await.unwrap();
    assert_eq!(processed, 1);

    let store = StateStore::open(&db_path).await.unwrap();
    let (status,): (String,) =
        sqlx::query_as("SELECT status FROM job_tasks WHERE url LIKE '%edgesuite%'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(status, "DONE");

    let details: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM job_details WHERE url LIKE '%edgesuite%'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(details, 0);
}

#[tokio::test]
async fn failed_extraction_backs_off_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.sqlite3");

    {
        let store = StateStore::open(&db_path).await.unwrap();
        store
            .add_job_tasks("A", &["https://a.example/jobs/1".to_string()])
            .await
            .unwrap();
        store.close().await;
    }

    let mut pipeline = stub_pipeline(dir.path(), Duration::from_secs(10));
    pipeline.puppeteer_script = write_script(dir.path(), "fail.sh", "exit 1\n");

    // One loop pass: claim, fail, then the backoff leaves nothing claimable.
    let store = StateStore::open(&db_path).await.unwrap();
    let claim = store.claim_job_task("test-owner").await.unwrap().unwrap();
    let err = run_extraction(&pipeline, &claim.url).await.unwrap_err();
    assert!(store
        .fail_job_task(&claim.url, &err.to_string(), 30_000)
        .await
        .unwrap());

    assert!(store.claim_job_task("test-owner").await.unwrap().is_none());
    let (status, last_error): (String, String) =
        sqlx::query_as("SELECT status, last_error FROM job_tasks")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(status, "FAILED");
    assert!(last_error.contains("puppeteer_failed"));
}
