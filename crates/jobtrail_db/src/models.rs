//! Row models for the jobtrail store.
//!
//! Uses derive macros for FromRow to map database rows to structs, and a
//! `sqlx::Type` enum for queue statuses. Every status written by the queue
//! modules is bound from this enum, and every transition goes through
//! `transition_to`, so an illegal transition cannot reach SQL.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::DbError;

/// Jobs asking for at least this many years of experience are excluded
/// from digests.
pub const MIN_YEARS_THRESHOLD: i64 = 4;

/// Durable queue row status.
///
/// Diff rows only ever use {Pending, InProgress, Done}; job tasks
/// additionally use Failed, which becomes claimable again once
/// `backoff_until_ms` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    InProgress,
    Failed,
    Done,
}

impl QueueStatus {
    /// The legal transitions of the queue state machine.
    pub fn may_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Failed, InProgress)
                | (InProgress, Done)
                | (InProgress, Failed)
                | (InProgress, Pending) // reap or diff failure
        )
    }

    /// Validate a transition, yielding the `(from, to)` pair the queue
    /// modules bind into the guarded UPDATE that performs it.
    pub fn transition_to(self, next: QueueStatus) -> crate::Result<(QueueStatus, QueueStatus)> {
        if !self.may_transition_to(next) {
            return Err(DbError::invalid_state(format!(
                "illegal queue transition {self:?} -> {next:?}"
            )));
        }
        Ok((self, next))
    }
}

/// One full link set observed for a site at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub site: String,
    pub url: String,
    pub ts_ms: i64,
    pub snapshot_hash: String,
    pub links: Vec<String>,
}

/// A diff queue row handed to the claimant.
#[derive(Debug, Clone, FromRow)]
pub struct DiffClaim {
    pub id: i64,
    pub site: String,
    pub diff_hash: String,
    pub added_urls_json: String,
    pub status: QueueStatus,
    pub attempts: i64,
}

impl DiffClaim {
    /// Decode the stored URL list. Non-string entries are dropped.
    pub fn added_urls(&self) -> crate::Result<Vec<String>> {
        let values: Vec<serde_json::Value> = serde_json::from_str(&self.added_urls_json)?;
        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .filter(|s| !s.is_empty())
            .collect())
    }
}

/// A job task row handed to the claimant.
#[derive(Debug, Clone, FromRow)]
pub struct TaskClaim {
    pub id: i64,
    pub site: String,
    pub url: String,
    pub status: QueueStatus,
    pub attempts: i64,
}

/// Inference result written back by the worker.
#[derive(Debug, Clone)]
pub struct JobDetailUpdate {
    pub site: String,
    pub url: String,
    pub job_title: String,
    pub min_years: i64,
    pub include_job: bool,
    pub exclude_reason: Option<String>,
    pub raw_json: serde_json::Value,
}

/// A job detail row qualifying for the next digest.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmailCandidate {
    pub site: String,
    pub url: String,
    pub job_title: String,
    pub min_years: i64,
    pub created_ts_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&QueueStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::from_str::<QueueStatus>("\"PENDING\"").unwrap(),
            QueueStatus::Pending
        );
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        use QueueStatus::*;
        assert!(Pending.may_transition_to(InProgress));
        assert!(Failed.may_transition_to(InProgress));
        assert!(InProgress.may_transition_to(Done));
        assert!(InProgress.may_transition_to(Pending));
        assert!(!Done.may_transition_to(Pending));
        assert!(!Pending.may_transition_to(Done));
        assert!(!Failed.may_transition_to(Done));
    }

    #[test]
    fn transition_to_validates_the_pair() {
        let (from, to) = QueueStatus::Pending
            .transition_to(QueueStatus::InProgress)
            .unwrap();
        assert_eq!(from, QueueStatus::Pending);
        assert_eq!(to, QueueStatus::InProgress);

        let err = QueueStatus::Done
            .transition_to(QueueStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }

    #[test]
    fn diff_claim_drops_non_string_urls() {
        let claim = DiffClaim {
            id: 1,
            site: "A".into(),
            diff_hash: "h".into(),
            added_urls_json: r#"["https://a/1", 7, null, "", "https://a/2"]"#.into(),
            status: QueueStatus::InProgress,
            attempts: 1,
        };
        assert_eq!(claim.added_urls().unwrap(), vec!["https://a/1", "https://a/2"]);
    }
}
