//! Snapshot commands: batch, single target and seeding.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use jobtrail_scout::{
    run_batch, run_seed, run_single, BatchOptions, ExtractorConfig, SeedOptions, SingleOptions,
};

#[derive(Debug)]
pub struct SnapshotArgs {
    pub csv: PathBuf,
    pub db: PathBuf,
    pub node_workdir: PathBuf,
    pub node_bin: String,
    pub node_timeout_seconds: u64,
    pub stop_on_error: bool,
    pub max_workers: usize,
}

pub async fn run(args: SnapshotArgs) -> Result<()> {
    let report = run_batch(&BatchOptions {
        csv_path: args.csv,
        db_path: args.db,
        extractor: ExtractorConfig {
            node_bin: args.node_bin,
            workdir: args.node_workdir,
            timeout: Duration::from_secs(args.node_timeout_seconds),
        },
        stop_on_error: args.stop_on_error,
        max_workers: args.max_workers,
    })
    .await?;

    // Per-target failures are carried in the report, not the exit code.
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Debug)]
pub struct RunOnceArgs {
    pub site: String,
    pub url: String,
    pub db: PathBuf,
    pub node_workdir: PathBuf,
    pub node_bin: String,
    pub node_timeout_seconds: u64,
}

pub async fn run_once(args: RunOnceArgs) -> Result<()> {
    let summary = run_single(&SingleOptions {
        site: args.site,
        url: args.url,
        db_path: args.db,
        extractor: ExtractorConfig {
            node_bin: args.node_bin,
            workdir: args.node_workdir,
            timeout: Duration::from_secs(args.node_timeout_seconds),
        },
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[derive(Debug)]
pub struct SeedArgs {
    pub csv: PathBuf,
    pub db: PathBuf,
    pub node_workdir: PathBuf,
    pub node_bin: String,
    pub node_timeout_seconds: u64,
    pub clear_current_snapshot_first: bool,
    pub stop_on_error: bool,
    pub max_workers: usize,
}

pub async fn seed(args: SeedArgs) -> Result<()> {
    let report = run_seed(&SeedOptions {
        csv_path: args.csv,
        db_path: args.db,
        extractor: ExtractorConfig {
            node_bin: args.node_bin,
            workdir: args.node_workdir,
            timeout: Duration::from_secs(args.node_timeout_seconds),
        },
        clear_current_snapshot_first: args.clear_current_snapshot_first,
        stop_on_error: args.stop_on_error,
        max_workers: args.max_workers,
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
