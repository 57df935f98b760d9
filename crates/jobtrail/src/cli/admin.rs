//! Administrative commands.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use jobtrail_db::StateStore;
use jobtrail_digest::AuditCsv;
use jobtrail_logging::default_audit_csv_path;

pub async fn clear_diffs(db: PathBuf) -> Result<()> {
    let store = StateStore::open(&db)
        .await
        .with_context(|| format!("failed to open state db: {}", db.display()))?;
    let deleted = store.clear_diff_queue().await?;
    println!("cleared_diff_queue rows_deleted={deleted}");
    Ok(())
}

pub async fn rebuild_audit(db: PathBuf, csv: Option<PathBuf>, timezone: String) -> Result<()> {
    let timezone = chrono_tz::Tz::from_str(&timezone)
        .map_err(|_| anyhow::anyhow!("unknown time zone: {timezone}"))?;

    let store = StateStore::open(&db)
        .await
        .with_context(|| format!("failed to open state db: {}", db.display()))?;
    let rows = store.list_emailed_jobs().await?;

    let audit = AuditCsv::new(csv.unwrap_or_else(default_audit_csv_path), timezone);
    let written = audit.rebuild_from(&rows)?;
    println!(
        "rebuilt_audit_csv path={} rows={written}",
        audit.path().display()
    );
    Ok(())
}
