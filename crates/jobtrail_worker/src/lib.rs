//! Diff expansion and per-URL inference workers.
//!
//! Both run in one poll loop against the job task queue: each iteration
//! reaps stuck rows, expands at most one pending diff into tasks, then
//! claims and processes at most one task through the external extraction
//! pipeline.

pub mod expander;
pub mod pipeline;
pub mod url_filter;
pub mod worker;

pub use expander::expand_one_diff;
pub use pipeline::{run_extraction, ExperienceResult, PipelineConfig, PipelineError};
pub use url_filter::{is_http_url, should_skip_url};
pub use worker::{run_worker, WorkerOptions};
