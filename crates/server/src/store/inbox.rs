//! Postgres-backed in-app inbox.
//!
//! Read and dismiss are two-step transitions inside one transaction: stamp
//! the inbox row, then rewrite the IN_APP channel entry (and the derived
//! overall status) on the owning alert log row. Both steps are idempotent,
//! so replaying a click is harmless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use duewatch_core::{Channel, ChannelDelivery, DeliveryStatus, ReviewerId};
use duewatch_engine::store::StoreError;
use duewatch_notify::{InboxNotification, InboxWriter, NotifyError};

use super::map_sqlx;

const MAX_LIST_LIMIT: i64 = 200;

const ITEM_COLUMNS: &str =
    "id, alert_id, reviewer_id, schedule_id, alert_kind, subject, body, created_at, read_at, dismissed_at";

/// One inbox row as the API returns it.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct InboxItem {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub alert_id: Uuid,
    #[schema(value_type = String)]
    pub reviewer_id: Uuid,
    #[schema(value_type = String)]
    pub schedule_id: Uuid,
    pub alert_kind: String,
    pub subject: String,
    pub body: String,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    pub read_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub dismissed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
enum InboxTransition {
    Read,
    Dismissed,
}

impl InboxTransition {
    fn stamp_sql(self) -> String {
        match self {
            InboxTransition::Read => format!(
                "UPDATE inbox_notifications
                 SET read_at = COALESCE(read_at, now())
                 WHERE id = $1
                 RETURNING {ITEM_COLUMNS}"
            ),
            InboxTransition::Dismissed => format!(
                "UPDATE inbox_notifications
                 SET dismissed_at = COALESCE(dismissed_at, now())
                 WHERE id = $1
                 RETURNING {ITEM_COLUMNS}"
            ),
        }
    }

    /// The overall status only moves forward: SENT may become READ, and
    /// SENT or READ may become DISMISSED. FAILED and BOUNCED stay put.
    fn propagate_sql(self) -> &'static str {
        match self {
            InboxTransition::Read => {
                "UPDATE alert_log
                 SET channels = $2,
                     overall_status = CASE WHEN overall_status = 'SENT'
                                           THEN 'READ' ELSE overall_status END
                 WHERE id = $1"
            }
            InboxTransition::Dismissed => {
                "UPDATE alert_log
                 SET channels = $2,
                     overall_status = CASE WHEN overall_status IN ('SENT', 'READ')
                                           THEN 'DISMISSED' ELSE overall_status END
                 WHERE id = $1"
            }
        }
    }

    fn next_status(self, current: DeliveryStatus) -> Option<DeliveryStatus> {
        match (self, current) {
            (InboxTransition::Read, DeliveryStatus::Sent) => Some(DeliveryStatus::Read),
            (InboxTransition::Dismissed, DeliveryStatus::Sent | DeliveryStatus::Read) => {
                Some(DeliveryStatus::Dismissed)
            }
            _ => None,
        }
    }
}

pub struct PgInbox {
    pool: PgPool,
}

impl PgInbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_reviewer(
        &self,
        reviewer_id: ReviewerId,
        include_dismissed: bool,
        limit: i64,
    ) -> Result<Vec<InboxItem>, StoreError> {
        sqlx::query_as::<_, InboxItem>(&format!(
            "SELECT {ITEM_COLUMNS}
             FROM inbox_notifications
             WHERE reviewer_id = $1 AND (dismissed_at IS NULL OR $2)
             ORDER BY created_at DESC
             LIMIT $3"
        ))
        .bind(reviewer_id)
        .bind(include_dismissed)
        .bind(limit.clamp(1, MAX_LIST_LIMIT))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    /// Returns `None` when no inbox row has that id.
    pub async fn mark_read(&self, id: Uuid) -> Result<Option<InboxItem>, StoreError> {
        self.transition(id, InboxTransition::Read).await
    }

    pub async fn mark_dismissed(&self, id: Uuid) -> Result<Option<InboxItem>, StoreError> {
        self.transition(id, InboxTransition::Dismissed).await
    }

    async fn transition(
        &self,
        id: Uuid,
        kind: InboxTransition,
    ) -> Result<Option<InboxItem>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let item = sqlx::query_as::<_, InboxItem>(&kind.stamp_sql())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let Some(item) = item else {
            return Ok(None);
        };

        // Lock the owning alert row so two concurrent transitions cannot
        // interleave their channel rewrites.
        let channels: sqlx::types::Json<Vec<ChannelDelivery>> =
            sqlx::query_scalar("SELECT channels FROM alert_log WHERE id = $1 FOR UPDATE")
                .bind(item.alert_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx)?;

        let mut channels = channels.0;
        let mut changed = false;
        for delivery in channels
            .iter_mut()
            .filter(|d| d.channel == Channel::InApp)
        {
            if let Some(next) = kind.next_status(delivery.status) {
                delivery.status = next;
                delivery.error = None;
                changed = true;
            }
        }

        if changed {
            sqlx::query(kind.propagate_sql())
                .bind(item.alert_id)
                .bind(sqlx::types::Json(&channels))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(Some(item))
    }
}

#[async_trait]
impl InboxWriter for PgInbox {
    async fn write(&self, notification: &InboxNotification) -> Result<(), NotifyError> {
        sqlx::query(
            "INSERT INTO inbox_notifications
                 (id, alert_id, reviewer_id, schedule_id, alert_kind, subject, body, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(notification.id)
        .bind(notification.alert_id)
        .bind(notification.reviewer_id)
        .bind(notification.schedule_id)
        .bind(notification.alert_kind.as_str())
        .bind(&notification.subject)
        .bind(&notification.body)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| NotifyError::Inbox(e.to_string()))?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
