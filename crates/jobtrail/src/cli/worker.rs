//! The inference worker command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use jobtrail_worker::{run_worker, PipelineConfig, WorkerOptions};

#[derive(Debug)]
pub struct WorkerArgs {
    pub db: PathBuf,
    pub node_bin: String,
    pub puppeteer_script: PathBuf,
    pub python_bin: String,
    pub extract_experience_py: PathBuf,
    pub timeout_seconds: u64,
    pub poll_sleep_seconds: u64,
    pub max_jobs_per_run: u64,
}

pub async fn run(args: WorkerArgs) -> Result<()> {
    run_worker(&WorkerOptions {
        db_path: args.db,
        pipeline: PipelineConfig {
            node_bin: args.node_bin,
            puppeteer_script: args.puppeteer_script,
            python_bin: args.python_bin,
            extractor_script: args.extract_experience_py,
            timeout: Duration::from_secs(args.timeout_seconds),
        },
        poll_sleep: Duration::from_secs(args.poll_sleep_seconds),
        max_jobs_per_run: args.max_jobs_per_run,
    })
    .await?;
    Ok(())
}
