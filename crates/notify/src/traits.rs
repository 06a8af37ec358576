//! Notifier trait definition and shared error types.

use std::time::Duration;

use duewatch_core::{AlertKind, Channel, DeadlineKind, Reviewer, ScheduleId};
use uuid::Uuid;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("recipient rejected permanently: {0}")]
    Bounced(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("inbox write failed: {0}")]
    Inbox(String),
}

impl NotifyError {
    /// Whether retrying the same delivery could ever succeed.
    ///
    /// Bounces, template errors, and misconfiguration are permanent;
    /// SMTP transport errors, timeouts, and inbox store errors are
    /// transient and eligible for retry.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NotifyError::Bounced(_) | NotifyError::Template(_) | NotifyError::Config(_)
        )
    }
}

/// A rendered notification ready for delivery to one recipient.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// Alert log entry this delivery belongs to.
    pub alert_id: Uuid,
    /// The rendered subject line.
    pub subject: String,
    /// The rendered body content.
    pub body: String,
    /// Schedule the alert originated from.
    pub schedule_id: ScheduleId,
    /// Whether this is an upcoming-deadline or overdue alert.
    pub alert_kind: AlertKind,
    /// Which review deadline the alert concerns.
    pub deadline_kind: DeadlineKind,
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to a single recipient through this channel.
    async fn send(&self, to: &Reviewer, notification: &Notification) -> Result<(), NotifyError>;

    /// The delivery channel this notifier implements.
    fn channel(&self) -> Channel;
}
