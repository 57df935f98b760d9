//! The digest command.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use jobtrail_db::StateStore;
use jobtrail_digest::{run_digest, DigestOptions, SmtpConfig, SmtpMailer};
use jobtrail_logging::{default_audit_csv_path, secrets_env_path};

#[derive(Debug)]
pub struct DigestArgs {
    pub db: PathBuf,
    pub limit: i64,
    pub csv: Option<PathBuf>,
    pub timezone: String,
}

pub async fn run(args: DigestArgs) -> Result<()> {
    // Credentials live in the state directory; a missing file is fine as
    // long as the variables come from somewhere.
    let _ = dotenvy::from_path(secrets_env_path());
    let _ = dotenvy::dotenv();

    let smtp = SmtpConfig::from_env()?;
    let timezone = chrono_tz::Tz::from_str(&args.timezone)
        .map_err(|_| anyhow::anyhow!("unknown time zone: {}", args.timezone))?;

    let store = StateStore::open(&args.db)
        .await
        .with_context(|| format!("failed to open state db: {}", args.db.display()))?;

    let outcome = run_digest(
        &store,
        &SmtpMailer::new(smtp),
        &DigestOptions {
            limit: args.limit,
            csv_path: args.csv.unwrap_or_else(default_audit_csv_path),
            timezone,
        },
    )
    .await?;

    if outcome.sent {
        println!(
            "digest_sent count={} digest_id={}",
            outcome.marked,
            outcome.digest_id.unwrap_or_default()
        );
    } else {
        println!("no_jobs_ready");
    }
    Ok(())
}
