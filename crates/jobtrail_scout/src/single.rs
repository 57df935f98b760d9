//! One-off snapshot of a single `(site, url)` target.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use jobtrail_db::{now_epoch_ms, SnapshotRow, StateStore};

use crate::diffing::{build_diff_payload, diff_links, snapshot_hash_for_links};
use crate::extractor::{fetch_links, ExtractorConfig};

#[derive(Debug, Clone)]
pub struct SingleOptions {
    pub site: String,
    pub url: String,
    pub db_path: PathBuf,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub site: String,
    pub url: String,
    pub old_link_count: usize,
    pub new_link_count: usize,
    pub added_link_count: usize,
    pub snapshot_written: bool,
    pub diff_enqueued: bool,
}

/// Run the snapshot contract once for an ad-hoc target.
pub async fn run_single(options: &SingleOptions) -> Result<RunSummary> {
    let store = StateStore::open(&options.db_path)
        .await
        .with_context(|| format!("failed to open state db: {}", options.db_path.display()))?;

    let old_links = store
        .current_links(&options.site)
        .await?
        .unwrap_or_default();

    let fetch = fetch_links(&options.extractor, &options.url).await?;
    let (added, _removed) = diff_links(&old_links, &fetch.links);
    let diff_payload = build_diff_payload(&options.site, &added);

    let diff_enqueued = if diff_payload.added_urls.is_empty() {
        false
    } else {
        store
            .enqueue_diff(
                &options.site,
                &diff_payload.diff_hash,
                &diff_payload.added_urls,
            )
            .await?
    };

    let snapshot = SnapshotRow {
        site: options.site.clone(),
        url: options.url.clone(),
        ts_ms: now_epoch_ms(),
        snapshot_hash: snapshot_hash_for_links(&fetch.links),
        links: fetch.links.clone(),
    };
    store.upsert_snapshot(&snapshot).await?;

    Ok(RunSummary {
        site: options.site.clone(),
        url: options.url.clone(),
        old_link_count: old_links.len(),
        new_link_count: fetch.links.len(),
        added_link_count: diff_payload.added_urls.len(),
        snapshot_written: true,
        diff_enqueued,
    })
}
