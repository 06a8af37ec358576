//! Alert deduplication.
//!
//! Two rules, matching the two alert kinds:
//! - THRESHOLD: suppressed while a non-FAILED entry for the same key exists
//!   inside a rolling window (default 24h).
//! - OVERDUE: at most one non-FAILED entry per schedule/reviewer/deadline
//!   per calendar day. Callers derive the evaluation date in the
//!   institution timezone, so the day bucket follows local midnight.
//!
//! The guard is a pre-check against the log; the race between concurrent
//! writers is settled by the uniqueness of `dedupe_key` at reserve time.
//! Both use the same key, so the pre-check and the constraint can never
//! disagree about what counts as a duplicate.

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use duewatch_core::{AlertEvent, AlertKind, DeadlineKind, ReviewerId, ScheduleId};

use crate::store::{AlertLog, StoreError};

/// The identity of one alert occurrence: who gets told what about which
/// deadline. THRESHOLD keys carry the matched threshold so that e.g. the
/// 7-day and the 3-day alert for one deadline stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub schedule_id: ScheduleId,
    pub reviewer_id: ReviewerId,
    pub alert_kind: AlertKind,
    pub deadline_kind: DeadlineKind,
    pub days_before: Option<u32>,
}

impl AlertKey {
    pub fn for_event(event: &AlertEvent, reviewer_id: ReviewerId) -> Self {
        Self {
            schedule_id: event.schedule_id,
            reviewer_id,
            alert_kind: event.kind,
            deadline_kind: event.deadline,
            days_before: event.days_before,
        }
    }
}

/// Stable hash of (key, evaluation day), stored on the log entry and covered
/// by a partial unique index. Including the day makes the constraint enforce
/// "once per day" for OVERDUE and "no concurrent double-claim" for THRESHOLD
/// without blocking a re-send on a later day.
pub fn dedupe_key(key: &AlertKey, day: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.schedule_id.as_bytes());
    hasher.update(key.reviewer_id.as_bytes());
    hasher.update(key.alert_kind.as_str().as_bytes());
    hasher.update(key.deadline_kind.as_str().as_bytes());
    if let Some(days) = key.days_before {
        hasher.update(days.to_be_bytes());
    }
    hasher.update(day.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Suppress(SuppressReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// A THRESHOLD alert for the key went out inside the rolling window.
    WithinWindow,
    /// An OVERDUE alert already went out on this evaluation day.
    AlreadySentToday,
}

/// Pre-dispatch dedup check. Holds only the window policy; the log is
/// passed per call.
#[derive(Debug, Clone, Copy)]
pub struct DedupeGuard {
    window: chrono::Duration,
}

impl DedupeGuard {
    pub fn new(window: chrono::Duration) -> Self {
        Self { window }
    }

    pub async fn check(
        &self,
        log: &dyn AlertLog,
        key: &AlertKey,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<GuardDecision, StoreError> {
        match key.alert_kind {
            AlertKind::Threshold => {
                let since = now - self.window;
                if log.recent_non_failed(key, since).await? {
                    Ok(GuardDecision::Suppress(SuppressReason::WithinWindow))
                } else {
                    Ok(GuardDecision::Allow)
                }
            }
            AlertKind::Overdue => {
                if log.live_entry_exists(&dedupe_key(key, today)).await? {
                    Ok(GuardDecision::Suppress(SuppressReason::AlreadySentToday))
                } else {
                    Ok(GuardDecision::Allow)
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAlertLog;
    use crate::store::{AlertReservation, ReserveOutcome};
    use duewatch_core::{Channel, ChannelDelivery, DeliveryStatus, DispatchOutcome, RecipientRole};
    use uuid::Uuid;

    fn key(kind: AlertKind, days_before: Option<u32>) -> AlertKey {
        AlertKey {
            schedule_id: Uuid::new_v4(),
            reviewer_id: Uuid::new_v4(),
            alert_kind: kind,
            deadline_kind: DeadlineKind::L1,
            days_before,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    async fn record(
        log: &MemoryAlertLog,
        key: &AlertKey,
        day: NaiveDate,
        sent_at: DateTime<Utc>,
    ) -> Uuid {
        let reservation = AlertReservation {
            key: *key,
            role: RecipientRole::Primary,
            dedupe_key: dedupe_key(key, day),
            sent_at,
        };
        match log.reserve(&reservation).await.unwrap() {
            ReserveOutcome::Reserved(id) => id,
            other => panic!("expected reservation, got {:?}", other),
        }
    }

    #[test]
    fn test_dedupe_key_distinguishes_thresholds() {
        let base = key(AlertKind::Threshold, Some(7));
        let other = AlertKey {
            days_before: Some(3),
            ..base
        };
        let day = date(2026, 2, 20);
        assert_ne!(dedupe_key(&base, day), dedupe_key(&other, day));
    }

    #[test]
    fn test_dedupe_key_changes_with_day() {
        let k = key(AlertKind::Overdue, None);
        assert_ne!(
            dedupe_key(&k, date(2026, 2, 20)),
            dedupe_key(&k, date(2026, 2, 21))
        );
    }

    #[tokio::test]
    async fn test_threshold_suppressed_within_window() {
        let log = MemoryAlertLog::new();
        let guard = DedupeGuard::new(chrono::Duration::hours(24));
        let k = key(AlertKind::Threshold, Some(3));
        record(&log, &k, date(2026, 2, 20), ts("2026-02-20T07:00:00Z")).await;

        // Six hours later (a manual trigger, say) the same key is suppressed.
        let decision = guard
            .check(&log, &k, date(2026, 2, 20), ts("2026-02-20T13:00:00Z"))
            .await
            .unwrap();
        assert_eq!(
            decision,
            GuardDecision::Suppress(SuppressReason::WithinWindow)
        );
    }

    #[tokio::test]
    async fn test_threshold_allowed_after_window() {
        let log = MemoryAlertLog::new();
        let guard = DedupeGuard::new(chrono::Duration::hours(24));
        let k = key(AlertKind::Threshold, Some(3));
        record(&log, &k, date(2026, 2, 20), ts("2026-02-20T07:00:00Z")).await;

        let decision = guard
            .check(&log, &k, date(2026, 2, 21), ts("2026-02-21T07:00:01Z"))
            .await
            .unwrap();
        assert_eq!(decision, GuardDecision::Allow);
    }

    #[tokio::test]
    async fn test_threshold_failed_entry_does_not_suppress() {
        let log = MemoryAlertLog::new();
        let guard = DedupeGuard::new(chrono::Duration::hours(24));
        let k = key(AlertKind::Threshold, Some(3));
        let id = record(&log, &k, date(2026, 2, 20), ts("2026-02-20T07:00:00Z")).await;
        log.finalize(
            id,
            &DispatchOutcome {
                channels: vec![ChannelDelivery {
                    channel: Channel::Email,
                    status: DeliveryStatus::Failed,
                    attempts: 3,
                    error: Some("smtp unreachable".to_string()),
                }],
                error: Some("smtp unreachable".to_string()),
            },
        )
        .await
        .unwrap();

        let decision = guard
            .check(&log, &k, date(2026, 2, 20), ts("2026-02-20T09:00:00Z"))
            .await
            .unwrap();
        assert_eq!(decision, GuardDecision::Allow);
    }

    #[tokio::test]
    async fn test_overdue_once_per_day() {
        let log = MemoryAlertLog::new();
        let guard = DedupeGuard::new(chrono::Duration::hours(24));
        let k = key(AlertKind::Overdue, None);
        record(&log, &k, date(2026, 2, 20), ts("2026-02-20T07:00:00Z")).await;

        let same_day = guard
            .check(&log, &k, date(2026, 2, 20), ts("2026-02-20T19:00:00Z"))
            .await
            .unwrap();
        assert_eq!(
            same_day,
            GuardDecision::Suppress(SuppressReason::AlreadySentToday)
        );
    }

    #[tokio::test]
    async fn test_overdue_next_day_not_blocked_by_window() {
        // An overdue alert sent at 23:50 must fire again the next day even
        // though fewer than 24 hours have passed — the bucket is the day,
        // not a rolling window.
        let log = MemoryAlertLog::new();
        let guard = DedupeGuard::new(chrono::Duration::hours(24));
        let k = key(AlertKind::Overdue, None);
        record(&log, &k, date(2026, 2, 20), ts("2026-02-20T23:50:00Z")).await;

        let decision = guard
            .check(&log, &k, date(2026, 2, 21), ts("2026-02-21T07:00:00Z"))
            .await
            .unwrap();
        assert_eq!(decision, GuardDecision::Allow);
    }
}
