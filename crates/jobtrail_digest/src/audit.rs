//! The append-only emailed-jobs audit CSV.
//!
//! The database's `emailed_ts_ms` is the source of truth; this file is a
//! human-readable view, appended before each send so the attached copy
//! already contains the digest being sent.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use jobtrail_db::{EmailCandidate, EmailedJob};

const AUDIT_HEADER: [&str; 6] = [
    "emailed_date",
    "emailed_time",
    "site",
    "url",
    "job_title",
    "min_years",
];

pub struct AuditCsv {
    path: PathBuf,
    tz: Tz,
}

impl AuditCsv {
    pub fn new(path: impl Into<PathBuf>, tz: Tz) -> Self {
        Self { path: path.into(), tz }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row per job, writing the header first when the file is
    /// new or empty.
    pub fn append_digest_rows(
        &self,
        jobs: &[EmailCandidate],
        now_utc: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open audit csv: {}", self.path.display()))?;
        let mut writer = csv::Writer::from_writer(file);

        if needs_header {
            writer.write_record(AUDIT_HEADER)?;
        }

        let (emailed_date, emailed_time) = format_display_time(now_utc, self.tz);
        for job in jobs {
            writer.write_record([
                emailed_date.as_str(),
                emailed_time.as_str(),
                job.site.as_str(),
                job.url.as_str(),
                job.job_title.as_str(),
                &job.min_years.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Regenerate the whole file from the database's emailed rows,
    /// replacing it atomically via a temp-file rename.
    pub fn rebuild_from(&self, rows: &[EmailedJob]) -> Result<usize> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            writer.write_record(AUDIT_HEADER)?;
            for row in rows {
                let emailed_utc = Utc
                    .timestamp_millis_opt(row.emailed_ts_ms)
                    .single()
                    .unwrap_or_else(Utc::now);
                let (emailed_date, emailed_time) = format_display_time(emailed_utc, self.tz);
                writer.write_record([
                    emailed_date.as_str(),
                    emailed_time.as_str(),
                    row.site.as_str(),
                    row.url.as_str(),
                    row.job_title.as_str(),
                    &row.min_years.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(rows.len())
    }

    /// The current file contents, for attaching to the outbound email.
    pub fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Split a timestamp into display date and 12-hour time in `tz`, with the
/// leading zero on the hour stripped.
fn format_display_time(now_utc: DateTime<Utc>, tz: Tz) -> (String, String) {
    let local = now_utc.with_timezone(&tz);
    let date = local.format("%Y-%m-%d").to_string();
    let time = local.format("%I:%M:%S %p").to_string();
    let time = time.trim_start_matches('0').to_string();
    (date, time)
}
