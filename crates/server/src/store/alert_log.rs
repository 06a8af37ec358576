//! Postgres-backed alert log.
//!
//! `reserve` leans on the partial unique index over live dedupe keys, so a
//! duplicate claim surfaces as a 23505 instead of a second row. FAILED
//! entries fall outside the index and never block a retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use duewatch_core::{
    AlertKind, AlertLogEntry, ChannelDelivery, DeadlineKind, DeliveryStatus, DispatchOutcome,
    RecipientRole, ReviewerId, ScheduleId,
};
use duewatch_engine::dedupe::AlertKey;
use duewatch_engine::store::{AlertLog, AlertReservation, ReserveOutcome, StoreError};

use super::{is_unique_violation, map_sqlx};

const MAX_LIST_LIMIT: i64 = 500;

const ENTRY_COLUMNS: &str = "id, schedule_id, reviewer_id, recipient_role, alert_kind, \
     deadline_kind, days_before, channels, overall_status, error, dedupe_key, sent_at";

pub struct PgAlertLog {
    pool: PgPool,
}

impl PgAlertLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Audit-trail listing for the API. Filters are ANDed; absent filters
    /// match everything.
    pub async fn list(&self, query: &AlertLogQuery) -> Result<Vec<AlertLogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AlertLogRow>(&format!(
            "SELECT {ENTRY_COLUMNS}
             FROM alert_log
             WHERE ($1::uuid IS NULL OR schedule_id = $1)
               AND ($2::uuid IS NULL OR reviewer_id = $2)
               AND ($3::text IS NULL OR alert_kind = $3)
               AND ($4::text IS NULL OR overall_status = $4)
               AND ($5::timestamptz IS NULL OR sent_at >= $5)
             ORDER BY sent_at DESC
             LIMIT $6"
        ))
        .bind(query.schedule_id)
        .bind(query.reviewer_id)
        .bind(query.alert_kind.map(|k| k.as_str()))
        .bind(query.status.map(|s| s.as_str()))
        .bind(query.since)
        .bind(query.limit().clamp(1, MAX_LIST_LIMIT))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(AlertLogRow::into_entry).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertLogQuery {
    pub schedule_id: Option<ScheduleId>,
    pub reviewer_id: Option<ReviewerId>,
    pub alert_kind: Option<AlertKind>,
    pub status: Option<DeliveryStatus>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AlertLogQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(100)
    }
}

#[async_trait]
impl AlertLog for PgAlertLog {
    async fn recent_non_failed(
        &self,
        key: &AlertKey,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM alert_log
                 WHERE schedule_id = $1
                   AND reviewer_id = $2
                   AND alert_kind = $3
                   AND deadline_kind = $4
                   AND days_before IS NOT DISTINCT FROM $5
                   AND overall_status <> 'FAILED'
                   AND sent_at >= $6
             )",
        )
        .bind(key.schedule_id)
        .bind(key.reviewer_id)
        .bind(key.alert_kind.as_str())
        .bind(key.deadline_kind.as_str())
        .bind(key.days_before.map(|d| d as i32))
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn live_entry_exists(&self, dedupe_key: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM alert_log
                 WHERE dedupe_key = $1 AND overall_status <> 'FAILED'
             )",
        )
        .bind(dedupe_key)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn reserve(&self, reservation: &AlertReservation) -> Result<ReserveOutcome, StoreError> {
        let id = Uuid::new_v4();
        let key = &reservation.key;
        let result = sqlx::query(
            "INSERT INTO alert_log
                 (id, schedule_id, reviewer_id, recipient_role, alert_kind,
                  deadline_kind, days_before, dedupe_key, sent_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(key.schedule_id)
        .bind(key.reviewer_id)
        .bind(reservation.role.as_str())
        .bind(key.alert_kind.as_str())
        .bind(key.deadline_kind.as_str())
        .bind(key.days_before.map(|d| d as i32))
        .bind(&reservation.dedupe_key)
        .bind(reservation.sent_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(ReserveOutcome::Reserved(id)),
            Err(e) if is_unique_violation(&e) => Ok(ReserveOutcome::Duplicate),
            Err(e) => Err(map_sqlx(e)),
        }
    }

    async fn finalize(&self, entry_id: Uuid, outcome: &DispatchOutcome) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE alert_log SET channels = $2, overall_status = $3, error = $4 WHERE id = $1",
        )
        .bind(entry_id)
        .bind(sqlx::types::Json(&outcome.channels))
        .bind(outcome.overall().as_str())
        .bind(&outcome.error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!(
                "alert log entry {entry_id} not found"
            )));
        }
        Ok(())
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct AlertLogRow {
    id: Uuid,
    schedule_id: Uuid,
    reviewer_id: Uuid,
    recipient_role: String,
    alert_kind: String,
    deadline_kind: String,
    days_before: Option<i32>,
    channels: sqlx::types::Json<Vec<ChannelDelivery>>,
    overall_status: String,
    error: Option<String>,
    dedupe_key: String,
    sent_at: DateTime<Utc>,
}

impl AlertLogRow {
    fn into_entry(self) -> Result<AlertLogEntry, StoreError> {
        Ok(AlertLogEntry {
            id: self.id,
            schedule_id: self.schedule_id,
            reviewer_id: self.reviewer_id,
            recipient_role: parse_enum("recipient role", &self.recipient_role, RecipientRole::parse)?,
            alert_kind: parse_enum("alert kind", &self.alert_kind, AlertKind::parse)?,
            deadline_kind: parse_enum("deadline kind", &self.deadline_kind, DeadlineKind::parse)?,
            days_before: self.days_before,
            channels: self.channels.0,
            overall_status: parse_enum("delivery status", &self.overall_status, DeliveryStatus::parse)?,
            error: self.error,
            dedupe_key: self.dedupe_key,
            sent_at: self.sent_at,
        })
    }
}

fn parse_enum<T>(
    what: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, StoreError> {
    parse(value).ok_or_else(|| StoreError::Query(format!("unknown {what} '{value}' in alert log")))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use duewatch_core::Channel;

    fn row() -> AlertLogRow {
        AlertLogRow {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            reviewer_id: Uuid::new_v4(),
            recipient_role: "PRIMARY".to_string(),
            alert_kind: "THRESHOLD".to_string(),
            deadline_kind: "L1".to_string(),
            days_before: Some(7),
            channels: sqlx::types::Json(vec![ChannelDelivery {
                channel: Channel::Email,
                status: DeliveryStatus::Sent,
                attempts: 1,
                error: None,
            }]),
            overall_status: "SENT".to_string(),
            error: None,
            dedupe_key: "k".to_string(),
            sent_at: Utc::now(),
        }
    }

    #[test]
    fn test_alert_log_row_parses_enum_columns() {
        let entry = row().into_entry().unwrap();
        assert_eq!(entry.recipient_role, RecipientRole::Primary);
        assert_eq!(entry.alert_kind, AlertKind::Threshold);
        assert_eq!(entry.deadline_kind, DeadlineKind::L1);
        assert_eq!(entry.overall_status, DeliveryStatus::Sent);
        assert_eq!(entry.channels.len(), 1);
    }

    #[test]
    fn test_alert_log_row_rejects_unknown_status() {
        let mut bad = row();
        bad.overall_status = "EXPLODED".to_string();
        let err = bad.into_entry().unwrap_err();
        assert!(err.to_string().contains("EXPLODED"));
    }

    #[test]
    fn test_query_limit_defaults_to_100() {
        assert_eq!(AlertLogQuery::default().limit(), 100);
        let q = AlertLogQuery {
            limit: Some(25),
            ..Default::default()
        };
        assert_eq!(q.limit(), 25);
    }
}
