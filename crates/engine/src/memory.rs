//! In-memory store implementations for the engine test suite.
//!
//! `MemoryAlertLog::reserve` mirrors the production uniqueness rule: at most
//! one live (non-FAILED) entry per dedupe_key.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use duewatch_core::{
    AlertLogEntry, DeliveryStatus, DispatchOutcome, ReviewSchedule, ReviewerAssignment,
    ReviewerId, ScheduleId,
};

use crate::dedupe::AlertKey;
use crate::store::{AlertLog, AlertReservation, ReserveOutcome, ScheduleStore, StoreError};

#[derive(Default)]
pub struct MemoryScheduleStore {
    schedules: Vec<ReviewSchedule>,
    assignments: HashMap<ScheduleId, Vec<ReviewerAssignment>>,
    pending: HashMap<ScheduleId, HashMap<ReviewerId, u32>>,
    fail_pending: Mutex<HashSet<ScheduleId>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_schedule(
        &mut self,
        schedule: ReviewSchedule,
        assignments: Vec<ReviewerAssignment>,
        pending: HashMap<ReviewerId, u32>,
    ) {
        self.assignments.insert(schedule.id, assignments);
        self.pending.insert(schedule.id, pending);
        self.schedules.push(schedule);
    }

    /// Make `pending_counts` fail for one schedule, simulating a partial
    /// outage of the external system.
    pub fn fail_pending_for(&self, schedule_id: ScheduleId) {
        self.fail_pending
            .lock()
            .expect("fail_pending lock poisoned")
            .insert(schedule_id);
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn active_schedules(&self) -> Result<Vec<ReviewSchedule>, StoreError> {
        Ok(self
            .schedules
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn schedule_by_id(&self, id: ScheduleId) -> Result<Option<ReviewSchedule>, StoreError> {
        Ok(self.schedules.iter().find(|s| s.id == id).cloned())
    }

    async fn assignments(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<ReviewerAssignment>, StoreError> {
        Ok(self
            .assignments
            .get(&schedule_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn pending_counts(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<HashMap<ReviewerId, u32>, StoreError> {
        if self
            .fail_pending
            .lock()
            .expect("fail_pending lock poisoned")
            .contains(&schedule_id)
        {
            return Err(StoreError::Unavailable("pending-work source down".to_string()));
        }
        Ok(self.pending.get(&schedule_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryAlertLog {
    entries: Mutex<Vec<AlertLogEntry>>,
    force_duplicate: AtomicBool,
}

impl MemoryAlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AlertLogEntry> {
        self.entries.lock().expect("entries lock poisoned").clone()
    }

    /// Make every subsequent `reserve` report `Duplicate`, as if another
    /// cycle instance claimed the alert first.
    pub fn force_duplicate(&self) {
        self.force_duplicate.store(true, Ordering::Relaxed);
    }

    fn matches_key(entry: &AlertLogEntry, key: &AlertKey) -> bool {
        entry.schedule_id == key.schedule_id
            && entry.reviewer_id == key.reviewer_id
            && entry.alert_kind == key.alert_kind
            && entry.deadline_kind == key.deadline_kind
            && entry.days_before == key.days_before.map(|d| d as i32)
    }
}

#[async_trait]
impl AlertLog for MemoryAlertLog {
    async fn recent_non_failed(
        &self,
        key: &AlertKey,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .lock()
            .expect("entries lock poisoned")
            .iter()
            .any(|e| {
                Self::matches_key(e, key)
                    && e.overall_status != DeliveryStatus::Failed
                    && e.sent_at >= since
            }))
    }

    async fn live_entry_exists(&self, dedupe_key: &str) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .lock()
            .expect("entries lock poisoned")
            .iter()
            .any(|e| e.dedupe_key == dedupe_key && e.overall_status != DeliveryStatus::Failed))
    }

    async fn reserve(&self, reservation: &AlertReservation) -> Result<ReserveOutcome, StoreError> {
        if self.force_duplicate.load(Ordering::Relaxed) {
            return Ok(ReserveOutcome::Duplicate);
        }
        let mut entries = self.entries.lock().expect("entries lock poisoned");
        let taken = entries.iter().any(|e| {
            e.dedupe_key == reservation.dedupe_key && e.overall_status != DeliveryStatus::Failed
        });
        if taken {
            return Ok(ReserveOutcome::Duplicate);
        }
        let id = Uuid::new_v4();
        entries.push(AlertLogEntry {
            id,
            schedule_id: reservation.key.schedule_id,
            reviewer_id: reservation.key.reviewer_id,
            recipient_role: reservation.role,
            alert_kind: reservation.key.alert_kind,
            deadline_kind: reservation.key.deadline_kind,
            days_before: reservation.key.days_before.map(|d| d as i32),
            channels: Vec::new(),
            overall_status: DeliveryStatus::Pending,
            error: None,
            dedupe_key: reservation.dedupe_key.clone(),
            sent_at: reservation.sent_at,
        });
        Ok(ReserveOutcome::Reserved(id))
    }

    async fn finalize(&self, entry_id: Uuid, outcome: &DispatchOutcome) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("entries lock poisoned");
        match entries.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                entry.channels = outcome.channels.clone();
                entry.overall_status = outcome.overall();
                entry.error = outcome.error.clone();
                Ok(())
            }
            None => Err(StoreError::Query(format!(
                "no alert log entry to finalize: {}",
                entry_id
            ))),
        }
    }
}
