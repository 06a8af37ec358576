//! Read-only schedule store backed by the review platform's tables.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use duewatch_core::{
    AlertConfig, Channel, Deadlines, ReviewSchedule, Reviewer, ReviewerAssignment, ReviewerId,
    ScheduleId,
};
use duewatch_engine::store::{ScheduleStore, StoreError};

use super::map_sqlx;

const SCHEDULE_COLUMNS: &str = "s.id, s.semester, s.review_start_date, \
     s.l1_deadline, s.l2_deadline, s.final_deadline, \
     s.alert_enabled, s.alert_days_before, s.alert_channels, s.alert_send_overdue, \
     s.is_active, \
     m.id AS manager_id, m.name AS manager_name, m.email AS manager_email";

pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn active_schedules(&self) -> Result<Vec<ReviewSchedule>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS}
             FROM review_schedules s
             JOIN reviewers m ON m.id = s.manager_id
             WHERE s.is_active AND s.alert_enabled
             ORDER BY s.review_start_date"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        // A single unreadable row must not take the whole cycle down.
        let mut schedules = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match row.into_schedule() {
                Ok(schedule) => schedules.push(schedule),
                Err(e) => {
                    warn!(schedule_id = %id, error = %e, "skipping schedule with unreadable alert settings");
                }
            }
        }
        Ok(schedules)
    }

    async fn schedule_by_id(&self, id: ScheduleId) -> Result<Option<ReviewSchedule>, StoreError> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS}
             FROM review_schedules s
             JOIN reviewers m ON m.id = s.manager_id
             WHERE s.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(ScheduleRow::into_schedule).transpose()
    }

    async fn assignments(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<ReviewerAssignment>, StoreError> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            "SELECT a.schedule_id, a.department,
                    p.id AS primary_id, p.name AS primary_name, p.email AS primary_email,
                    b.id AS backup_id, b.name AS backup_name, b.email AS backup_email
             FROM reviewer_assignments a
             JOIN reviewers p ON p.id = a.primary_reviewer_id
             LEFT JOIN reviewers b ON b.id = a.backup_reviewer_id
             WHERE a.schedule_id = $1
             ORDER BY a.department",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(AssignmentRow::into_assignment).collect())
    }

    async fn pending_counts(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<HashMap<ReviewerId, u32>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, i32)>(
            "SELECT reviewer_id, pending_items FROM pending_work WHERE schedule_id = $1",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|(reviewer_id, items)| (reviewer_id, items.max(0) as u32))
            .collect())
    }
}

// ── Row types ───────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    semester: String,
    review_start_date: NaiveDate,
    l1_deadline: Option<NaiveDate>,
    l2_deadline: Option<NaiveDate>,
    final_deadline: Option<NaiveDate>,
    alert_enabled: bool,
    alert_days_before: Vec<i32>,
    alert_channels: Vec<String>,
    alert_send_overdue: bool,
    is_active: bool,
    manager_id: Uuid,
    manager_name: String,
    manager_email: String,
}

impl ScheduleRow {
    fn into_schedule(self) -> Result<ReviewSchedule, StoreError> {
        let mut channels = Vec::with_capacity(self.alert_channels.len());
        for value in &self.alert_channels {
            let channel = Channel::parse(value).ok_or_else(|| {
                StoreError::Query(format!("unknown alert channel '{}'", value))
            })?;
            channels.push(channel);
        }
        let mut days_before = Vec::with_capacity(self.alert_days_before.len());
        for d in self.alert_days_before {
            if d < 0 {
                return Err(StoreError::Query(format!(
                    "negative alert threshold {d}"
                )));
            }
            days_before.push(d as u32);
        }

        Ok(ReviewSchedule {
            id: self.id,
            semester: self.semester,
            review_start_date: self.review_start_date,
            deadlines: Deadlines {
                l1: self.l1_deadline,
                l2: self.l2_deadline,
                final_review: self.final_deadline,
            },
            alert_config: AlertConfig {
                enabled: self.alert_enabled,
                days_before,
                channels,
                send_overdue: self.alert_send_overdue,
            },
            is_active: self.is_active,
            manager: Reviewer {
                id: self.manager_id,
                name: self.manager_name,
                email: self.manager_email,
            },
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    schedule_id: Uuid,
    department: String,
    primary_id: Uuid,
    primary_name: String,
    primary_email: String,
    backup_id: Option<Uuid>,
    backup_name: Option<String>,
    backup_email: Option<String>,
}

impl AssignmentRow {
    fn into_assignment(self) -> ReviewerAssignment {
        let backup = match (self.backup_id, self.backup_name, self.backup_email) {
            (Some(id), Some(name), Some(email)) => Some(Reviewer { id, name, email }),
            _ => None,
        };
        ReviewerAssignment {
            schedule_id: self.schedule_id,
            department: self.department,
            primary: Reviewer {
                id: self.primary_id,
                name: self.primary_name,
                email: self.primary_email,
            },
            backup,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
