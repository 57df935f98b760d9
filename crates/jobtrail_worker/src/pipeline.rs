//! The two-stage extraction pipeline.
//!
//! Stage A (headless browser) writes page text to stdout; stage B
//! (experience extractor) reads that stream and prints a small JSON
//! document. Each stage runs in its own process group so that a timeout
//! can signal the whole group — the browser stage forks children that
//! would otherwise outlive it.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// How much stderr/stdout to carry into diagnostics.
const PREVIEW_CHARS: usize = 800;

/// Grace period between SIGTERM and SIGKILL on timeout.
const KILL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub node_bin: String,
    pub puppeteer_script: PathBuf,
    pub python_bin: String,
    pub extractor_script: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start pipeline stage: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("pipeline_timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{stage}_failed rc={code:?} stderr={stderr_preview}")]
    StageFailed {
        stage: &'static str,
        code: Option<i32>,
        stderr_preview: String,
    },

    #[error("invalid_json_from_extract_experience error={error} raw={raw_preview}")]
    InvalidJson { error: String, raw_preview: String },
}

/// Coerced extraction result.
///
/// `min_years` collapses to 0 when missing, non-numeric or negative;
/// `job_title` is the trimmed string or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperienceResult {
    pub job_title: String,
    pub min_years: i64,
}

impl ExperienceResult {
    pub fn coerce(value: &serde_json::Value) -> Self {
        let job_title = value
            .get("job_title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        let min_years = value
            .get("min_years")
            .and_then(|v| v.as_f64())
            .filter(|y| y.is_finite() && *y >= 0.0)
            .map(|y| y as i64)
            .unwrap_or(0);

        Self { job_title, min_years }
    }
}

/// Run the extraction pipeline for one URL and parse stage B's stdout.
pub async fn run_extraction(
    config: &PipelineConfig,
    url: &str,
) -> Result<serde_json::Value, PipelineError> {
    let mut stage_a = Command::new(&config.node_bin);
    stage_a
        .arg(&config.puppeteer_script)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    new_process_group(&mut stage_a);

    let mut child_a = stage_a.spawn()?;
    let pid_a = child_a.id();

    let stdout_a = child_a.stdout.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "stage A stdout unavailable")
    })?;

    let mut stage_b = Command::new(&config.python_bin);
    stage_b
        .arg(&config.extractor_script)
        .stdin(into_stdio(stdout_a)?)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    new_process_group(&mut stage_b);

    let child_b = stage_b.spawn()?;
    let pid_b = child_b.id();

    debug!(url, pid_a, pid_b, "pipeline started");

    let output_b = match tokio::time::timeout(config.timeout, child_b.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            signal_group(pid_b, TERM);
            signal_group(pid_a, TERM);
            tokio::time::sleep(KILL_GRACE).await;
            signal_group(pid_b, KILL);
            signal_group(pid_a, KILL);
            let _ = child_a.wait().await;
            return Err(PipelineError::Timeout(config.timeout));
        }
    };

    let output_a = child_a.wait_with_output().await?;

    if !output_a.status.success() {
        return Err(PipelineError::StageFailed {
            stage: "puppeteer",
            code: output_a.status.code(),
            stderr_preview: preview(&String::from_utf8_lossy(&output_a.stderr)),
        });
    }
    if !output_b.status.success() {
        return Err(PipelineError::StageFailed {
            stage: "extract_experience",
            code: output_b.status.code(),
            stderr_preview: preview(&String::from_utf8_lossy(&output_b.stderr)),
        });
    }

    let stdout = String::from_utf8_lossy(&output_b.stdout);
    serde_json::from_str(stdout.trim()).map_err(|e| PipelineError::InvalidJson {
        error: e.to_string(),
        raw_preview: preview(&stdout),
    })
}

fn preview(text: &str) -> String {
    text.trim().replace('\n', "\\n").chars().take(PREVIEW_CHARS).collect()
}

#[cfg(unix)]
const TERM: i32 = libc::SIGTERM;
#[cfg(unix)]
const KILL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
const TERM: i32 = 15;
#[cfg(not(unix))]
const KILL: i32 = 9;

/// Put the child in a fresh session so its pid names a process group we
/// can signal as a whole.
#[cfg(unix)]
fn new_process_group(command: &mut Command) {
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn new_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: i32) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), signal);
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: i32) {}

fn into_stdio(stdout: tokio::process::ChildStdout) -> std::io::Result<Stdio> {
    stdout.try_into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_takes_well_formed_values() {
        let result = ExperienceResult::coerce(&json!({"job_title": " Engineer ", "min_years": 3}));
        assert_eq!(result.job_title, "Engineer");
        assert_eq!(result.min_years, 3);
    }

    #[test]
    fn coerce_collapses_invalid_years_to_zero() {
        for value in [
            json!({"min_years": -2}),
            json!({"min_years": "five"}),
            json!({"min_years": null}),
            json!({}),
        ] {
            assert_eq!(ExperienceResult::coerce(&value).min_years, 0, "value {value}");
        }
    }

    #[test]
    fn coerce_truncates_fractional_years() {
        assert_eq!(
            ExperienceResult::coerce(&json!({"min_years": 2.8})).min_years,
            2
        );
    }

    #[test]
    fn coerce_missing_title_is_empty() {
        assert_eq!(
            ExperienceResult::coerce(&json!({"min_years": 1})).job_title,
            ""
        );
    }
}
