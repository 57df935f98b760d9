//! SQLite persistence layer for the jobtrail pipeline.
//!
//! One durable sqlite file holds all pipeline state:
//! - `snapshots` is the append-only history of every link set ever fetched
//! - `current_snapshot` is the latest link set per site, for fast diff bases
//! - `diff_queue` and `job_tasks` are durable work queues with claim/lease
//!   semantics and backoff
//! - `job_details` holds terminal inference results and digest bookkeeping
//!
//! Recovery model: if a run crashes mid-way, the last committed snapshot
//! remains valid, queue rows are only ever transitioned by guarded updates,
//! and unique indexes make re-enqueues no-ops. Stale IN_PROGRESS rows are
//! returned to PENDING by the reap primitives.

pub mod diff_queue;
mod error;
pub mod job_details;
pub mod job_tasks;
mod models;
mod pool;
mod schema;
pub mod snapshots;

pub use diff_queue::{DEFAULT_DIFF_BACKOFF_MS, DEFAULT_REAP_TIMEOUT_MS};
pub use error::{DbError, Result};
pub use job_details::EmailedJob;
pub use job_tasks::DEFAULT_TASK_BACKOFF_MS;
pub use models::{
    DiffClaim, EmailCandidate, JobDetailUpdate, QueueStatus, SnapshotRow, TaskClaim,
    MIN_YEARS_THRESHOLD,
};
pub use pool::StateStore;

/// Current wall-clock time as epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Host-scoped claim attribution string (`hostname:pid`).
///
/// Claim correctness does not depend on this being unique; it exists for
/// observability of who held a row.
pub fn default_owner() -> String {
    let host = gethostname::gethostname();
    format!("{}:{}", host.to_string_lossy(), std::process::id())
}
