//! Jobtrail unified launcher.
//!
//! One subcommand per pipeline stage; each exits 0 on success and nonzero
//! with a single diagnostic line on fatal errors. Batch commands print a
//! JSON report on stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jobtrail_logging::{init_logging, LogConfig};

mod cli;

#[derive(Parser, Debug)]
#[command(name = "jobtrail", about = "Careers-page watcher and job digest pipeline")]
struct Cli {
    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Snapshot every configured target and enqueue diffs for new URLs
    Snapshot {
        /// CSV with company,url columns
        #[arg(long)]
        csv: PathBuf,

        /// Path to the state database
        #[arg(long, default_value = "./state/snapshots.sqlite3")]
        db: PathBuf,

        /// Directory containing the Node link extractor (index.js)
        #[arg(long)]
        node_workdir: PathBuf,

        /// Node binary to use
        #[arg(long, default_value = "node")]
        node_bin: String,

        /// Per-target extractor timeout
        #[arg(long, default_value_t = 180)]
        node_timeout_seconds: u64,

        /// Abort remaining targets after the first failure
        #[arg(long)]
        stop_on_error: bool,

        /// Fetch fan-out; 1 runs targets serially in configured order
        #[arg(long, default_value_t = 4)]
        max_workers: usize,
    },

    /// Snapshot a single ad-hoc (site, url) target
    RunOnce {
        #[arg(long)]
        site: String,

        #[arg(long)]
        url: String,

        #[arg(long, default_value = "./state/snapshots.sqlite3")]
        db: PathBuf,

        #[arg(long)]
        node_workdir: PathBuf,

        #[arg(long, default_value = "node")]
        node_bin: String,

        #[arg(long, default_value_t = 180)]
        node_timeout_seconds: u64,
    },

    /// Seed current snapshots from a target CSV without enqueuing diffs
    Seed {
        #[arg(long)]
        csv: PathBuf,

        #[arg(long, default_value = "./state/snapshots.sqlite3")]
        db: PathBuf,

        #[arg(long)]
        node_workdir: PathBuf,

        #[arg(long, default_value = "node")]
        node_bin: String,

        #[arg(long, default_value_t = 180)]
        node_timeout_seconds: u64,

        /// DELETE FROM current_snapshot before seeding
        #[arg(long)]
        clear_current_snapshot_first: bool,

        #[arg(long)]
        stop_on_error: bool,

        #[arg(long, default_value_t = 4)]
        max_workers: usize,
    },

    /// Expand diffs and run per-URL experience inference
    Worker {
        #[arg(long, default_value = "./state/snapshots.sqlite3")]
        db: PathBuf,

        #[arg(long, default_value = "node")]
        node_bin: String,

        /// Headless-browser script printing page text JSON to stdout
        #[arg(long)]
        puppeteer_script: PathBuf,

        #[arg(long, default_value = "python")]
        python_bin: String,

        /// Experience extractor reading page text on stdin
        #[arg(long)]
        extract_experience_py: PathBuf,

        /// Per-task pipeline timeout
        #[arg(long, default_value_t = 120)]
        timeout_seconds: u64,

        /// Sleep between empty polls
        #[arg(long, default_value_t = 2)]
        poll_sleep_seconds: u64,

        /// Stop after this many processed jobs; 0 runs until interrupted
        #[arg(long, default_value_t = 0)]
        max_jobs_per_run: u64,
    },

    /// Email a digest of qualifying jobs not yet sent
    Digest {
        #[arg(long, default_value = "./state/snapshots.sqlite3")]
        db: PathBuf,

        /// Maximum jobs per digest
        #[arg(long, default_value_t = 200)]
        limit: i64,

        /// Audit CSV path; defaults to $EMAILED_JOBS_CSV or ./state/emailed_jobs.csv
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Display time zone for audit timestamps
        #[arg(long, default_value = "America/Denver")]
        timezone: String,
    },

    /// Administrative: delete every diff queue row
    ClearDiffs {
        #[arg(long, default_value = "./state/snapshots.sqlite3")]
        db: PathBuf,
    },

    /// Administrative: regenerate the audit CSV from the database
    RebuildAudit {
        #[arg(long, default_value = "./state/snapshots.sqlite3")]
        db: PathBuf,

        #[arg(long)]
        csv: Option<PathBuf>,

        #[arg(long, default_value = "America/Denver")]
        timezone: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "jobtrail",
        verbose: cli.verbose,
    }) {
        eprintln!("jobtrail: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Snapshot {
            csv,
            db,
            node_workdir,
            node_bin,
            node_timeout_seconds,
            stop_on_error,
            max_workers,
        } => {
            cli::snapshot::run(cli::snapshot::SnapshotArgs {
                csv,
                db,
                node_workdir,
                node_bin,
                node_timeout_seconds,
                stop_on_error,
                max_workers,
            })
            .await
        }

        Commands::RunOnce {
            site,
            url,
            db,
            node_workdir,
            node_bin,
            node_timeout_seconds,
        } => {
            cli::snapshot::run_once(cli::snapshot::RunOnceArgs {
                site,
                url,
                db,
                node_workdir,
                node_bin,
                node_timeout_seconds,
            })
            .await
        }

        Commands::Seed {
            csv,
            db,
            node_workdir,
            node_bin,
            node_timeout_seconds,
            clear_current_snapshot_first,
            stop_on_error,
            max_workers,
        } => {
            cli::snapshot::seed(cli::snapshot::SeedArgs {
                csv,
                db,
                node_workdir,
                node_bin,
                node_timeout_seconds,
                clear_current_snapshot_first,
                stop_on_error,
                max_workers,
            })
            .await
        }

        Commands::Worker {
            db,
            node_bin,
            puppeteer_script,
            python_bin,
            extract_experience_py,
            timeout_seconds,
            poll_sleep_seconds,
            max_jobs_per_run,
        } => {
            cli::worker::run(cli::worker::WorkerArgs {
                db,
                node_bin,
                puppeteer_script,
                python_bin,
                extract_experience_py,
                timeout_seconds,
                poll_sleep_seconds,
                max_jobs_per_run,
            })
            .await
        }

        Commands::Digest {
            db,
            limit,
            csv,
            timezone,
        } => {
            cli::digest::run(cli::digest::DigestArgs {
                db,
                limit,
                csv,
                timezone,
            })
            .await
        }

        Commands::ClearDiffs { db } => cli::admin::clear_diffs(db).await,

        Commands::RebuildAudit { db, csv, timezone } => {
            cli::admin::rebuild_audit(db, csv, timezone).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("jobtrail: {e:#}");
            ExitCode::FAILURE
        }
    }
}
