//! The digest run: select, render, audit, send, mark.

use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use jobtrail_db::{default_owner, StateStore, MIN_YEARS_THRESHOLD};

use crate::audit::AuditCsv;
use crate::mailer::{Mailer, OutboundDigest};
use crate::render::{format_html_digest, format_plaintext_digest};

#[derive(Debug, Clone)]
pub struct DigestOptions {
    pub limit: i64,
    pub csv_path: std::path::PathBuf,
    pub timezone: Tz,
}

#[derive(Debug, Clone)]
pub struct DigestOutcome {
    pub sent: bool,
    pub count: usize,
    pub digest_id: Option<String>,
    pub marked: u64,
}

/// Identifier for one outbound digest: sha256 of `owner:unix-seconds`,
/// truncated for readability.
pub fn digest_id(owner: &str) -> String {
    let input = format!("{owner}:{}", Utc::now().timestamp());
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hex: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Run one digest pass.
///
/// The audit CSV is appended before the send so the attachment includes
/// this digest's rows; marking happens only after a successful send, and
/// its `emailed_ts_ms IS NULL` guard keeps racing runs from double-sending
/// a job.
pub async fn run_digest(
    store: &StateStore,
    mailer: &impl Mailer,
    options: &DigestOptions,
) -> Result<DigestOutcome> {
    let owner = default_owner();
    let did = digest_id(&owner);

    let jobs = store.list_jobs_ready_for_email(options.limit).await?;
    if jobs.is_empty() {
        info!("no_jobs_ready");
        return Ok(DigestOutcome {
            sent: false,
            count: 0,
            digest_id: None,
            marked: 0,
        });
    }

    // Defense in depth: the selection query already applies the threshold.
    let jobs: Vec<_> = jobs
        .into_iter()
        .filter(|j| j.min_years < MIN_YEARS_THRESHOLD)
        .collect();
    if jobs.is_empty() {
        info!("no_jobs_ready_after_filter");
        return Ok(DigestOutcome {
            sent: false,
            count: 0,
            digest_id: None,
            marked: 0,
        });
    }

    let body_text = format_plaintext_digest(&jobs);
    let body_html = format_html_digest(&jobs);
    let subject = format!("Job alerts ({} new)", jobs.len());

    let audit = AuditCsv::new(&options.csv_path, options.timezone);
    if let Err(e) = audit.append_digest_rows(&jobs, Utc::now()) {
        warn!(error = %format!("{e:#}"), "failed_to_append_emailed_jobs_csv");
    }

    let attachment = match audit.read_bytes() {
        Ok(Some(bytes)) => {
            let filename = audit
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "emailed_jobs.csv".to_string());
            Some((filename, bytes))
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "failed_to_attach_file");
            None
        }
    };

    mailer
        .send(OutboundDigest {
            subject,
            body_text,
            body_html,
            attachment,
        })
        .await?;

    let urls: Vec<String> = jobs.iter().map(|j| j.url.clone()).collect();
    let marked = store.mark_jobs_emailed(&urls, &did).await?;
    info!(count = marked, digest_id = %did, "email_sent");

    Ok(DigestOutcome {
        sent: true,
        count: jobs.len(),
        digest_id: Some(did),
        marked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_id_is_short_hex() {
        let id = digest_id("host:1234");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
