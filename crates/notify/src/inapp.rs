//! In-app inbox notifier.
//!
//! Persists alerts as inbox notifications the reviewer sees inside the
//! application. Storage lives behind [`InboxWriter`] so the server can
//! back it with Postgres while tests use memory. Delivery is a single
//! synchronous write; there is no retry on this channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use duewatch_core::{AlertKind, Channel, Reviewer, ReviewerId, ScheduleId};
use uuid::Uuid;

use crate::traits::{Notification, Notifier, NotifyError};

/// One row in a reviewer's in-app inbox.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InboxNotification {
    pub id: Uuid,
    /// Alert log entry this notification was delivered for. Read and
    /// dismiss transitions propagate back to that entry.
    pub alert_id: Uuid,
    pub reviewer_id: ReviewerId,
    pub schedule_id: ScheduleId,
    pub alert_kind: AlertKind,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Storage backend for in-app notifications.
#[async_trait::async_trait]
pub trait InboxWriter: Send + Sync {
    async fn write(&self, notification: &InboxNotification) -> Result<(), NotifyError>;
}

/// Delivers alerts into the recipient's in-app inbox.
pub struct InAppNotifier {
    inbox: Arc<dyn InboxWriter>,
}

impl InAppNotifier {
    pub fn new(inbox: Arc<dyn InboxWriter>) -> Self {
        Self { inbox }
    }
}

#[async_trait::async_trait]
impl Notifier for InAppNotifier {
    async fn send(&self, to: &Reviewer, notification: &Notification) -> Result<(), NotifyError> {
        let row = InboxNotification {
            id: Uuid::new_v4(),
            alert_id: notification.alert_id,
            reviewer_id: to.id,
            schedule_id: notification.schedule_id,
            alert_kind: notification.alert_kind,
            subject: notification.subject.clone(),
            body: notification.body.clone(),
            created_at: Utc::now(),
        };
        self.inbox.write(&row).await?;

        tracing::info!(
            channel = "in_app",
            reviewer_id = %to.id,
            notification_id = %row.id,
            "notification delivered"
        );

        Ok(())
    }

    fn channel(&self) -> Channel {
        Channel::InApp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duewatch_core::DeadlineKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryInbox {
        rows: Mutex<Vec<InboxNotification>>,
        fail: AtomicBool,
    }

    #[async_trait::async_trait]
    impl InboxWriter for MemoryInbox {
        async fn write(&self, notification: &InboxNotification) -> Result<(), NotifyError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NotifyError::Inbox("connection refused".to_string()));
            }
            self.rows
                .lock()
                .expect("rows lock poisoned")
                .push(notification.clone());
            Ok(())
        }
    }

    fn reviewer() -> Reviewer {
        Reviewer {
            id: Uuid::new_v4(),
            name: "Priya Shah".to_string(),
            email: "priya@example.edu".to_string(),
        }
    }

    fn notification(alert_id: Uuid, schedule_id: ScheduleId) -> Notification {
        Notification {
            alert_id,
            subject: "First-level review due in 3 days".to_string(),
            body: "Hello".to_string(),
            schedule_id,
            alert_kind: AlertKind::Threshold,
            deadline_kind: DeadlineKind::L1,
        }
    }

    #[tokio::test]
    async fn send_writes_inbox_row() {
        let inbox = Arc::new(MemoryInbox::default());
        let notifier = InAppNotifier::new(inbox.clone());
        let to = reviewer();
        let alert_id = Uuid::new_v4();
        let schedule_id = Uuid::new_v4();

        notifier
            .send(&to, &notification(alert_id, schedule_id))
            .await
            .unwrap();

        let rows = inbox.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alert_id, alert_id);
        assert_eq!(rows[0].reviewer_id, to.id);
        assert_eq!(rows[0].schedule_id, schedule_id);
        assert_eq!(rows[0].alert_kind, AlertKind::Threshold);
        assert_eq!(rows[0].subject, "First-level review due in 3 days");
    }

    #[tokio::test]
    async fn write_failure_propagates() {
        let inbox = Arc::new(MemoryInbox::default());
        inbox.fail.store(true, Ordering::SeqCst);
        let notifier = InAppNotifier::new(inbox.clone());

        let result = notifier
            .send(&reviewer(), &notification(Uuid::new_v4(), Uuid::new_v4()))
            .await;
        match result.unwrap_err() {
            NotifyError::Inbox(msg) => assert!(msg.contains("connection refused")),
            other => panic!("expected Inbox error, got: {other:?}"),
        }
        assert!(inbox.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_is_in_app() {
        let notifier = InAppNotifier::new(Arc::new(MemoryInbox::default()));
        assert_eq!(notifier.channel(), Channel::InApp);
    }
}
