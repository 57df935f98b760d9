//! Snapshotter for configured careers-page targets.
//!
//! For every `(site, url)` target the scout invokes the external link
//! extractor, computes the delta against the stored snapshot, enqueues a
//! diff for any newly added URLs and commits the new snapshot. Fetches may
//! fan out concurrently; persistence is serialized by an in-process mutex
//! so commits are totally ordered.

pub mod batch;
pub mod diffing;
pub mod extractor;
pub mod seed;
pub mod single;
pub mod targets;

pub use batch::{run_batch, BatchOptions, BatchReport, TargetOutcome};
pub use diffing::{
    build_diff_payload, dedupe_preserve_order, diff_links, sha256_hex, snapshot_hash_for_links,
    DiffPayload,
};
pub use extractor::{fetch_links, ExtractorConfig, ExtractorError, LinkFetch};
pub use seed::{run_seed, SeedOptions, SeedReport};
pub use single::{run_single, RunSummary, SingleOptions};
pub use targets::{load_company_targets, CompanyTarget};
