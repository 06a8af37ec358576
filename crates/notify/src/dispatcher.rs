//! Routes rendered alerts to configured delivery channels.
//!
//! One dispatch call covers one (alert, recipient) pair: the subject and
//! body are rendered once, then every channel in the schedule's alert
//! config is attempted. Individual channel failures don't block other
//! channels. The outcome records status and attempt count per channel;
//! the worst channel status becomes the log entry's overall status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use duewatch_core::{
    AlertEvent, Channel, ChannelDelivery, DeliveryStatus, DispatchOutcome, Recipient,
    ReviewSchedule, Reviewer,
};
use duewatch_engine::Dispatch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::retry::RetryPolicy;
use crate::templating::{TemplateContext, TemplateRenderer};
use crate::traits::{Notification, Notifier, NotifyError};

/// Fans one alert out to every configured channel for one recipient.
pub struct Dispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    renderer: TemplateRenderer,
    email_retry: RetryPolicy,
    /// Upper bound on a single send attempt.
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        notifiers: Vec<Arc<dyn Notifier>>,
        renderer: TemplateRenderer,
        email_retry: RetryPolicy,
        send_timeout: Duration,
    ) -> Self {
        Self {
            notifiers,
            renderer,
            email_retry,
            send_timeout,
        }
    }

    fn notifier_for(&self, channel: Channel) -> Option<&Arc<dyn Notifier>> {
        self.notifiers.iter().find(|n| n.channel() == channel)
    }

    /// Email gets the configured backoff schedule; in-app writes are
    /// synchronous and never retried.
    fn retry_for(&self, channel: Channel) -> RetryPolicy {
        match channel {
            Channel::Email => self.email_retry,
            Channel::InApp => RetryPolicy::single(),
        }
    }

    /// Attempt delivery on one channel, retrying transient failures
    /// according to the channel's policy. Permanent failures stop the
    /// attempt loop immediately.
    async fn deliver(
        &self,
        notifier: &dyn Notifier,
        to: &Reviewer,
        notification: &Notification,
    ) -> ChannelDelivery {
        let channel = notifier.channel();
        let policy = self.retry_for(channel);
        let mut attempts = 0;
        let mut last_error: Option<NotifyError> = None;

        while attempts < policy.max_attempts {
            attempts += 1;
            let start = std::time::Instant::now();
            let result = match tokio::time::timeout(
                self.send_timeout,
                notifier.send(to, notification),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(self.send_timeout)),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    info!(
                        channel = %channel,
                        to = %to.email,
                        attempts,
                        duration_ms,
                        "alert delivered"
                    );
                    return ChannelDelivery {
                        channel,
                        status: DeliveryStatus::Sent,
                        attempts,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!(
                        channel = %channel,
                        to = %to.email,
                        attempt = attempts,
                        error = %e,
                        duration_ms,
                        "delivery attempt failed"
                    );
                    let permanent = e.is_permanent();
                    last_error = Some(e);
                    if permanent {
                        break;
                    }
                    if attempts < policy.max_attempts {
                        tokio::time::sleep(policy.delay_for(attempts)).await;
                    }
                }
            }
        }

        let status = match &last_error {
            Some(NotifyError::Bounced(_)) => DeliveryStatus::Bounced,
            _ => DeliveryStatus::Failed,
        };
        ChannelDelivery {
            channel,
            status,
            attempts,
            error: last_error.map(|e| e.to_string()),
        }
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(
        &self,
        alert_id: Uuid,
        schedule: &ReviewSchedule,
        event: &AlertEvent,
        recipient: &Recipient,
    ) -> DispatchOutcome {
        let channels = &schedule.alert_config.channels;

        let ctx = TemplateContext::for_alert(schedule, event, recipient);
        let message = match self.renderer.render(&ctx) {
            Ok(message) => message,
            Err(e) => {
                warn!(alert_id = %alert_id, error = %e, "template rendering failed, nothing delivered");
                let error = e.to_string();
                return DispatchOutcome {
                    channels: channels
                        .iter()
                        .map(|&channel| ChannelDelivery {
                            channel,
                            status: DeliveryStatus::Failed,
                            attempts: 0,
                            error: Some(error.clone()),
                        })
                        .collect(),
                    error: Some(error),
                };
            }
        };

        let notification = Notification {
            alert_id,
            subject: message.subject,
            body: message.body,
            schedule_id: schedule.id,
            alert_kind: event.kind,
            deadline_kind: event.deadline,
        };

        let mut deliveries = Vec::with_capacity(channels.len());
        for &channel in channels {
            let delivery = match self.notifier_for(channel) {
                Some(notifier) => {
                    self.deliver(notifier.as_ref(), &recipient.reviewer, &notification)
                        .await
                }
                None => {
                    warn!(channel = %channel, "no notifier registered for configured channel");
                    ChannelDelivery {
                        channel,
                        status: DeliveryStatus::Failed,
                        attempts: 0,
                        error: Some("channel not configured".to_string()),
                    }
                }
            };
            deliveries.push(delivery);
        }

        let error = worst_error(&deliveries);
        DispatchOutcome {
            channels: deliveries,
            error,
        }
    }
}

/// The error recorded on the log entry: the message from the most severe
/// failing channel.
fn worst_error(deliveries: &[ChannelDelivery]) -> Option<String> {
    deliveries
        .iter()
        .filter(|d| d.error.is_some())
        .max_by_key(|d| d.status.severity())
        .and_then(|d| d.error.clone())
}
