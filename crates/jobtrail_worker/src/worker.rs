//! The inference worker poll loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use jobtrail_db::{
    default_owner, JobDetailUpdate, StateStore, TaskClaim, DEFAULT_REAP_TIMEOUT_MS,
    DEFAULT_TASK_BACKOFF_MS, MIN_YEARS_THRESHOLD,
};

use crate::expander::expand_one_diff;
use crate::pipeline::{run_extraction, ExperienceResult, PipelineConfig};
use crate::url_filter::should_skip_url;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub db_path: PathBuf,
    pub pipeline: PipelineConfig,
    pub poll_sleep: Duration,
    /// 0 means run until interrupted.
    pub max_jobs_per_run: u64,
}

/// Run the worker loop. Returns the number of jobs processed.
///
/// Each iteration reaps stuck rows in both queues, expands at most one
/// diff, then claims and processes at most one task. An interrupt stops
/// the loop between items; any claim held at that point goes back to
/// PENDING through the reap path.
pub async fn run_worker(options: &WorkerOptions) -> Result<u64> {
    let owner = default_owner();
    info!(owner = %owner, db = %options.db_path.display(), "inference_worker_start");

    let store = StateStore::open(&options.db_path)
        .await
        .with_context(|| format!("failed to open state db: {}", options.db_path.display()))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut processed = 0u64;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!(processed, "worker_shutdown");
            return Ok(processed);
        }

        store.reap_stuck_diffs(DEFAULT_REAP_TIMEOUT_MS).await?;
        store.reap_stuck_job_tasks(DEFAULT_REAP_TIMEOUT_MS).await?;

        if let Err(e) = expand_one_diff(&store, &owner).await {
            warn!(error = %format!("{e:#}"), "diff_expansion_failed");
        }

        let Some(claim) = store.claim_job_task(&owner).await? else {
            tokio::time::sleep(options.poll_sleep).await;
            continue;
        };

        if process_task(&store, &options.pipeline, &claim).await? {
            processed += 1;
        }

        if options.max_jobs_per_run > 0 && processed >= options.max_jobs_per_run {
            info!(count = processed, "max_jobs_per_run_reached");
            return Ok(processed);
        }
    }
}

/// Drive one claimed task through the pipeline. Returns whether a job was
/// successfully processed.
async fn process_task(
    store: &StateStore,
    pipeline: &PipelineConfig,
    claim: &TaskClaim,
) -> Result<bool> {
    // The predicate ran at expansion; re-check in case the task predates
    // the filter or the blocklist grew.
    if should_skip_url(&claim.url) {
        info!(site = %claim.site, url = %claim.url, "job_skipped_invalid_url");
        if !store.complete_job_task(&claim.url).await? {
            warn!(url = %claim.url, "task_done_lost_claim");
        }
        return Ok(false);
    }

    match run_extraction(pipeline, &claim.url).await {
        Ok(raw) => {
            let result = ExperienceResult::coerce(&raw);
            let include_job = result.min_years < MIN_YEARS_THRESHOLD;
            let exclude_reason = (!include_job).then(|| "min_years_gte_4".to_string());

            store
                .upsert_job_details(&JobDetailUpdate {
                    site: claim.site.clone(),
                    url: claim.url.clone(),
                    job_title: result.job_title.clone(),
                    min_years: result.min_years,
                    include_job,
                    exclude_reason,
                    raw_json: raw,
                })
                .await?;
            if !store.complete_job_task(&claim.url).await? {
                warn!(url = %claim.url, "task_done_lost_claim");
            }

            info!(
                site = %claim.site,
                min_years = result.min_years,
                title = %truncate(&result.job_title, 80),
                "job_done"
            );
            Ok(true)
        }
        Err(e) => {
            error!(site = %claim.site, url = %claim.url, error = %e, "job_failed");
            if !store
                .fail_job_task(&claim.url, &e.to_string(), DEFAULT_TASK_BACKOFF_MS)
                .await?
            {
                warn!(url = %claim.url, "task_failure_lost_claim");
            }
            Ok(false)
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
