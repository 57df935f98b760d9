//! Batch snapshot runs over the full target list.
//!
//! Fetches fan out across a bounded worker pool; all persistence (the
//! read-snapshot base and the enqueue-diff + upsert-snapshot commit) is
//! serialized by one in-process mutex so commits are totally ordered and a
//! delta computation never reads another target's half-finished commit.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};

use jobtrail_db::{now_epoch_ms, SnapshotRow, StateStore};

use crate::diffing::{build_diff_payload, diff_links, snapshot_hash_for_links};
use crate::extractor::{fetch_links, ExtractorConfig};
use crate::targets::{load_company_targets, CompanyTarget};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub csv_path: PathBuf,
    pub db_path: PathBuf,
    pub extractor: ExtractorConfig,
    pub stop_on_error: bool,
    pub max_workers: usize,
}

/// Per-target result, serialized into the batch report.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub company: String,
    pub url: String,
    pub ok: bool,
    pub error: Option<String>,
    pub old_link_count: usize,
    pub new_link_count: usize,
    pub added_url_count: usize,
    pub diff_enqueued: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub csv_path: String,
    pub company_count_total: usize,
    pub company_ok_count: usize,
    pub company_fail_count: usize,
    pub started_ts_ms: i64,
    pub ended_ts_ms: i64,
    pub duration_ms: i64,
    pub results: Vec<TargetOutcome>,
}

/// Snapshot every configured target once.
pub async fn run_batch(options: &BatchOptions) -> Result<BatchReport> {
    let started_ms = now_epoch_ms();
    info!(
        csv_path = %options.csv_path.display(),
        db_path = %options.db_path.display(),
        node_bin = %options.extractor.node_bin,
        stop_on_error = options.stop_on_error,
        max_workers = options.max_workers,
        "batch_start"
    );

    let targets = load_company_targets(&options.csv_path)?;
    info!(count = targets.len(), "targets_loaded");

    let store = StateStore::open(&options.db_path)
        .await
        .with_context(|| format!("failed to open state db: {}", options.db_path.display()))?;
    let commit_lock = Arc::new(Mutex::new(()));

    let results = if options.max_workers <= 1 {
        run_serial(&store, &commit_lock, &targets, options).await
    } else {
        run_parallel(&store, &commit_lock, &targets, options).await
    };

    let ok_count = results.iter().filter(|r| r.ok).count();
    let fail_count = results.iter().filter(|r| !r.ok).count();
    let ended_ms = now_epoch_ms();

    info!(
        total = targets.len(),
        ok = ok_count,
        fail = fail_count,
        duration_ms = ended_ms - started_ms,
        "batch_done"
    );

    Ok(BatchReport {
        csv_path: options.csv_path.display().to_string(),
        company_count_total: targets.len(),
        company_ok_count: ok_count,
        company_fail_count: fail_count,
        started_ts_ms: started_ms,
        ended_ts_ms: ended_ms,
        duration_ms: ended_ms - started_ms,
        results,
    })
}

async fn run_serial(
    store: &StateStore,
    commit_lock: &Arc<Mutex<()>>,
    targets: &[CompanyTarget],
    options: &BatchOptions,
) -> Vec<TargetOutcome> {
    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        let outcome = snapshot_target(store, commit_lock, target, &options.extractor).await;
        let failed = !outcome.ok;
        results.push(outcome);
        if failed && options.stop_on_error {
            error!("stop_on_error=true cancelling_pending");
            break;
        }
    }
    results
}

async fn run_parallel(
    store: &StateStore,
    commit_lock: &Arc<Mutex<()>>,
    targets: &[CompanyTarget],
    options: &BatchOptions,
) -> Vec<TargetOutcome> {
    let semaphore = Arc::new(Semaphore::new(options.max_workers));
    let cancelled = Arc::new(AtomicBool::new(false));
    let mut join_set = JoinSet::new();

    for target in targets.iter().cloned() {
        let store = store.clone();
        let commit_lock = Arc::clone(commit_lock);
        let semaphore = Arc::clone(&semaphore);
        let cancelled = Arc::clone(&cancelled);
        let extractor = options.extractor.clone();

        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return None;
            };
            // Targets still queued when an earlier one failed are skipped;
            // already-running fetches finish normally.
            if cancelled.load(Ordering::SeqCst) {
                return None;
            }
            Some(snapshot_target(&store, &commit_lock, &target, &extractor).await)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let Ok(Some(outcome)) = joined else { continue };
        if !outcome.ok && options.stop_on_error {
            error!("stop_on_error=true cancelling_pending");
            cancelled.store(true, Ordering::SeqCst);
        }
        results.push(outcome);
    }
    results
}

/// The per-target contract: read base, fetch, diff, enqueue + commit.
async fn snapshot_target(
    store: &StateStore,
    commit_lock: &Mutex<()>,
    target: &CompanyTarget,
    extractor: &ExtractorConfig,
) -> TargetOutcome {
    let started = Instant::now();
    info!(company = %target.company, url = %target.url, "company_start");

    match snapshot_target_inner(store, commit_lock, target, extractor).await {
        Ok(outcome) => {
            info!(
                company = %target.company,
                ok = true,
                total_ms = started.elapsed().as_millis() as u64,
                old = outcome.old_link_count,
                new = outcome.new_link_count,
                added = outcome.added_url_count,
                diff_enqueued = outcome.diff_enqueued,
                "company_done"
            );
            outcome
        }
        Err(e) => {
            error!(company = %target.company, url = %target.url, error = %e, "company_failed");
            TargetOutcome {
                company: target.company.clone(),
                url: target.url.clone(),
                ok: false,
                error: Some(format!("{e:#}")),
                old_link_count: 0,
                new_link_count: 0,
                added_url_count: 0,
                diff_enqueued: false,
            }
        }
    }
}

async fn snapshot_target_inner(
    store: &StateStore,
    commit_lock: &Mutex<()>,
    target: &CompanyTarget,
    extractor: &ExtractorConfig,
) -> Result<TargetOutcome> {
    // Read the diff base under the lock so it cannot interleave with
    // another target's in-flight commit.
    let old_links = {
        let _guard = commit_lock.lock().await;
        store.current_links(&target.company).await?.unwrap_or_default()
    };

    // The fetch runs outside the lock; this is where the fan-out pays off.
    let fetch = fetch_links(extractor, &target.url).await?;

    let (added, removed) = diff_links(&old_links, &fetch.links);
    info!(
        company = %target.company,
        node_ms = fetch.node_ms,
        old = old_links.len(),
        new = fetch.links.len(),
        added = added.len(),
        removed = removed.len(),
        "delta_computed"
    );

    let diff_payload = build_diff_payload(&target.company, &added);

    let _guard = commit_lock.lock().await;
    let diff_enqueued = if diff_payload.added_urls.is_empty() {
        false
    } else {
        store
            .enqueue_diff(
                &target.company,
                &diff_payload.diff_hash,
                &diff_payload.added_urls,
            )
            .await?
    };

    let snapshot = SnapshotRow {
        site: target.company.clone(),
        url: target.url.clone(),
        ts_ms: now_epoch_ms(),
        snapshot_hash: snapshot_hash_for_links(&fetch.links),
        links: fetch.links.clone(),
    };
    store.upsert_snapshot(&snapshot).await?;

    Ok(TargetOutcome {
        company: target.company.clone(),
        url: target.url.clone(),
        ok: true,
        error: None,
        old_link_count: old_links.len(),
        new_link_count: fetch.links.len(),
        added_url_count: diff_payload.added_urls.len(),
        diff_enqueued,
    })
}
