//! Storage traits the engine runs against.
//!
//! Schedules, assignments, and pending counts live in an external system the
//! engine only reads. The alert log is the engine's own durable state and
//! doubles as the concurrency arbiter: `reserve` must enforce uniqueness on
//! `dedupe_key` so that two racing writers cannot both claim the same alert.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use duewatch_core::{
    DispatchOutcome, RecipientRole, ReviewSchedule, ReviewerAssignment, ReviewerId, ScheduleId,
};

use crate::dedupe::AlertKey;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("query failed: {0}")]
    Query(String),
}

/// Read access to review schedules and the pending-work snapshot.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// All schedules that should be considered by the daily cycle.
    async fn active_schedules(&self) -> Result<Vec<ReviewSchedule>, StoreError>;

    async fn schedule_by_id(&self, id: ScheduleId) -> Result<Option<ReviewSchedule>, StoreError>;

    async fn assignments(&self, schedule_id: ScheduleId)
        -> Result<Vec<ReviewerAssignment>, StoreError>;

    /// Pending item counts per reviewer for one schedule. Reviewers with no
    /// entry count as zero.
    async fn pending_counts(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<HashMap<ReviewerId, u32>, StoreError>;
}

/// What `reserve` decided: either this writer claimed the alert, or another
/// writer (or an earlier run) already holds a live entry for the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved(Uuid),
    Duplicate,
}

/// The fields needed to claim an alert before dispatching it. The entry is
/// written with status PENDING and no channel detail; `finalize` fills both
/// in once dispatch has run.
#[derive(Debug, Clone)]
pub struct AlertReservation {
    pub key: AlertKey,
    pub role: RecipientRole,
    pub dedupe_key: String,
    pub sent_at: DateTime<Utc>,
}

/// Append-only alert audit log.
#[async_trait]
pub trait AlertLog: Send + Sync {
    /// Does a non-FAILED entry for this exact key exist at or after `since`?
    async fn recent_non_failed(
        &self,
        key: &AlertKey,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Does a non-FAILED entry with this dedupe key exist? This is the same
    /// predicate the reserve-time uniqueness rule enforces, exposed as a
    /// cheap pre-check.
    async fn live_entry_exists(&self, dedupe_key: &str) -> Result<bool, StoreError>;

    /// Claim the alert or report that someone else already has. Must be
    /// atomic with respect to concurrent callers.
    async fn reserve(&self, reservation: &AlertReservation) -> Result<ReserveOutcome, StoreError>;

    /// Record the dispatch result on a previously reserved entry.
    async fn finalize(&self, entry_id: Uuid, outcome: &DispatchOutcome) -> Result<(), StoreError>;
}
