//! Snapshot seeding: populate `current_snapshot` from a target CSV without
//! enqueuing diffs.
//!
//! Used to establish a baseline so the next batch run only reports real
//! additions. Optionally clears the current-snapshot table first.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};

use jobtrail_db::{now_epoch_ms, SnapshotRow, StateStore};

use crate::diffing::snapshot_hash_for_links;
use crate::extractor::{fetch_links, ExtractorConfig};
use crate::targets::{load_company_targets, CompanyTarget};

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub csv_path: PathBuf,
    pub db_path: PathBuf,
    pub extractor: ExtractorConfig,
    pub clear_current_snapshot_first: bool,
    pub stop_on_error: bool,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedOutcome {
    pub company: String,
    pub url: String,
    pub ok: bool,
    pub error: Option<String>,
    pub link_count: usize,
    pub snapshot_hash: String,
}

#[derive(Debug, Serialize)]
pub struct SeedReport {
    pub csv_path: String,
    pub db_path: String,
    pub clear_current_snapshot_first: bool,
    pub company_count_total: usize,
    pub company_ok_count: usize,
    pub company_fail_count: usize,
    pub results: Vec<SeedOutcome>,
}

pub async fn run_seed(options: &SeedOptions) -> Result<SeedReport> {
    let targets = load_company_targets(&options.csv_path)?;
    info!(count = targets.len(), "targets_loaded");

    let store = StateStore::open(&options.db_path)
        .await
        .with_context(|| format!("failed to open state db: {}", options.db_path.display()))?;
    let commit_lock = Arc::new(Mutex::new(()));

    if options.clear_current_snapshot_first {
        let _guard = commit_lock.lock().await;
        info!("clear_current_snapshot_first=true deleting_current_snapshot");
        store.clear_current_snapshot().await?;
    }

    let semaphore = Arc::new(Semaphore::new(options.max_workers.max(1)));
    let cancelled = Arc::new(AtomicBool::new(false));
    let mut join_set = JoinSet::new();

    for target in targets.iter().cloned() {
        let store = store.clone();
        let commit_lock = Arc::clone(&commit_lock);
        let semaphore = Arc::clone(&semaphore);
        let cancelled = Arc::clone(&cancelled);
        let extractor = options.extractor.clone();

        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return None;
            };
            if cancelled.load(Ordering::SeqCst) {
                return None;
            }
            Some(seed_target(&store, &commit_lock, &target, &extractor).await)
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

    let ok_count = results.iter().filter(|r| r.ok).count();
    let fail_count = results.iter().filter(|r| !r.ok).count();

    Ok(SeedReport {
        csv_path: options.csv_path.display().to_string(),
        db_path: options.db_path.display().to_string(),
        clear_current_snapshot_first: options.clear_current_snapshot_first,
        company_count_total: targets.len(),
        company_ok_count: ok_count,
        company_fail_count: fail_count,
        results,
    })
}

async fn seed_target(
    store: &StateStore,
    commit_lock: &Mutex<()>,
    target: &CompanyTarget,
    extractor: &ExtractorConfig,
) -> SeedOutcome {
    match seed_target_inner(store, commit_lock, target, extractor).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(company = %target.company, url = %target.url, error = %e, "seed_failed");
            SeedOutcome {
                company: target.company.clone(),
                url: target.url.clone(),
                ok: false,
                error: Some(format!("{e:#}")),
                link_count: 0,
                snapshot_hash: String::new(),
            }
        }
    }
}

async fn seed_target_inner(
    store: &StateStore,
    commit_lock: &Mutex<()>,
    target: &CompanyTarget,
    extractor: &ExtractorConfig,
) -> Result<SeedOutcome> {
    let fetch = fetch_links(extractor, &target.url).await?;

    let snapshot = SnapshotRow {
        site: target.company.clone(),
        url: target.url.clone(),
        ts_ms: now_epoch_ms(),
        snapshot_hash: snapshot_hash_for_links(&fetch.links),
        links: fetch.links.clone(),
    };

    {
        let _guard = commit_lock.lock().await;
        store.upsert_snapshot(&snapshot).await?;
    }

    info!(
        company = %target.company,
        ok = true,
        node_ms = fetch.node_ms,
        link_count = fetch.links.len(),
        snapshot_hash = %snapshot.snapshot_hash,
        "seed_done"
    );

    Ok(SeedOutcome {
        company: target.company.clone(),
        url: target.url.clone(),
        ok: true,
        error: None,
        link_count: fetch.links.len(),
        snapshot_hash: snapshot.snapshot_hash,
    })
}
