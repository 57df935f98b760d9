//! Diff expansion: one claimed diff becomes per-URL inference tasks.

use anyhow::Result;
use tracing::{debug, info};

use jobtrail_db::{DiffClaim, StateStore, DEFAULT_DIFF_BACKOFF_MS};

use crate::url_filter::should_skip_url;

/// Claim and expand at most one pending diff.
///
/// Invalid URLs are dropped silently; survivors are batch-inserted into the
/// task queue with `(site, url)` dedup. Returns the number of tasks
/// actually created. On failure the diff is returned to PENDING with a
/// backoff and the error is propagated for logging.
pub async fn expand_one_diff(store: &StateStore, owner: &str) -> Result<u64> {
    let Some(claim) = store.claim_diff(owner).await? else {
        return Ok(0);
    };

    match expand(store, &claim).await {
        Ok(inserted) => {
            if !store.mark_diff_done(claim.id).await? {
                debug!(diff_id = claim.id, "diff reaped before done; leaving race outcome");
            }
            if inserted > 0 {
                info!(diff_id = claim.id, site = %claim.site, inserted_tasks = inserted, "expanded_diff");
            }
            Ok(inserted)
        }
        Err(e) => {
            if !store
                .mark_diff_failed(claim.id, &format!("{e:#}"), DEFAULT_DIFF_BACKOFF_MS)
                .await?
            {
                debug!(diff_id = claim.id, "diff reaped before failure was recorded");
            }
            Err(e)
        }
    }
}

async fn expand(store: &StateStore, claim: &DiffClaim) -> Result<u64> {
    let urls: Vec<String> = claim
        .added_urls()?
        .into_iter()
        .filter(|u| {
            let keep = !should_skip_url(u);
            if !keep {
                debug!(site = %claim.site, url = %u, "dropped invalid url");
            }
            keep
        })
        .collect();

    Ok(store.add_job_tasks(&claim.site, &urls).await?)
}
