//! Shared logging utilities for jobtrail binaries.
//!
//! Log lines go to stderr so that batch commands can print their JSON
//! reports on stdout undisturbed.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str =
    "jobtrail=info,jobtrail_db=info,jobtrail_scout=info,jobtrail_worker=info,jobtrail_digest=info";

/// Logging configuration shared by jobtrail binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with stderr output.
///
/// `RUST_LOG` overrides the default filter; `verbose` raises the default to
/// debug for the jobtrail crates.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = if config.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER.replace("info", "debug")))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging for {}: {e}", config.app_name))?;

    Ok(())
}

/// The state directory: `$JOBTRAIL_STATE` or `./state`.
pub fn state_dir() -> PathBuf {
    if let Ok(override_path) = std::env::var("JOBTRAIL_STATE") {
        return PathBuf::from(override_path);
    }
    PathBuf::from("./state")
}

/// Default path for the state database.
pub fn default_db_path() -> PathBuf {
    state_dir().join("snapshots.sqlite3")
}

/// Default path for the emailed-jobs audit CSV. `$EMAILED_JOBS_CSV`
/// overrides.
pub fn default_audit_csv_path() -> PathBuf {
    if let Ok(override_path) = std::env::var("EMAILED_JOBS_CSV") {
        return PathBuf::from(override_path);
    }
    state_dir().join("emailed_jobs.csv")
}

/// Path of the secrets env file holding SMTP and API credentials.
pub fn secrets_env_path() -> PathBuf {
    state_dir().join("secrets.env")
}
