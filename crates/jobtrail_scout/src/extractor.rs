//! External link extractor client.
//!
//! Invokes `<node-bin> index.js <url>` in a configured working directory
//! and parses stdout as one link per line. The child is killed if the
//! per-call timeout elapses or the call is cancelled.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::diffing::dedupe_preserve_order;

/// How much stderr to carry into error messages.
const STDERR_PREVIEW_BYTES: usize = 1000;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub node_bin: String,
    pub workdir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("failed to spawn link extractor: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("link extractor timed out after {0:?}")]
    Timeout(Duration),

    #[error("link extractor failed returncode={code:?} stderr={stderr_preview}")]
    NonZeroExit {
        code: Option<i32>,
        stderr_preview: String,
    },
}

/// One successful extractor call.
#[derive(Debug, Clone)]
pub struct LinkFetch {
    /// Deduplicated links, first occurrence order preserved.
    pub links: Vec<String>,
    pub raw_stdout_bytes: usize,
    pub raw_stderr_bytes: usize,
    pub node_ms: u64,
}

pub async fn fetch_links(config: &ExtractorConfig, url: &str) -> Result<LinkFetch, ExtractorError> {
    let started = Instant::now();

    let mut command = Command::new(&config.node_bin);
    command
        .arg("index.js")
        .arg(url)
        .current_dir(&config.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn()?;
    let output = match tokio::time::timeout(config.timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        // Dropping the in-flight wait kills the child (kill_on_drop).
        Err(_) => return Err(ExtractorError::Timeout(config.timeout)),
    };

    let node_ms = started.elapsed().as_millis() as u64;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    debug!(
        url,
        returncode = output.status.code(),
        node_ms,
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        "extractor finished"
    );

    if !output.status.success() {
        return Err(ExtractorError::NonZeroExit {
            code: output.status.code(),
            stderr_preview: stderr_preview(&stderr),
        });
    }

    let links = dedupe_preserve_order(
        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string),
    );

    Ok(LinkFetch {
        links,
        raw_stdout_bytes: stdout.len(),
        raw_stderr_bytes: stderr.len(),
        node_ms,
    })
}

fn stderr_preview(stderr: &str) -> String {
    let flat = stderr.trim().replace('\n', "\\n");
    flat.chars().take(STDERR_PREVIEW_BYTES).collect()
}
