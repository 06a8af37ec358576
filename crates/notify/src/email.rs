//! SMTP email notifier via `lettre` with TLS support.
//!
//! Delivers deadline alerts as emails through an SMTP server.
//! Supports STARTTLS and implicit TLS connections. Rejections with a
//! permanent SMTP status map to [`NotifyError::Bounced`] so the
//! dispatcher knows not to retry them.

use duewatch_core::config::SmtpConfig;
use duewatch_core::{Channel, Reviewer};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::traits::{Notification, Notifier, NotifyError};

/// Sends alerts as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    /// Async SMTP transport for sending emails.
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// Sender mailbox.
    from: Mailbox,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP configuration.
    ///
    /// Port 465 uses implicit TLS; other ports use STARTTLS when
    /// `cfg.tls` is set and a plaintext connection otherwise. If both
    /// `username` and `password` are configured they are passed to the
    /// transport; otherwise the connection is unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] if no host is configured or the
    /// sender address does not parse.
    pub fn from_config(cfg: &SmtpConfig) -> Result<Self, NotifyError> {
        if !cfg.is_configured() {
            return Err(NotifyError::Config("SMTP host is not set".to_string()));
        }

        let from: Mailbox = cfg.from_address.parse().map_err(
            |e: lettre::address::AddressError| {
                NotifyError::Config(format!(
                    "invalid sender address '{}': {e}",
                    cfg.from_address
                ))
            },
        )?;

        let mut builder = if cfg.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(cfg.port)
        } else if cfg.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(cfg.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host).port(cfg.port)
        };

        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    /// Send a notification email to a single recipient.
    async fn send(&self, to: &Reviewer, notification: &Notification) -> Result<(), NotifyError> {
        let address: lettre::Address = to.email.parse().map_err(
            |e: lettre::address::AddressError| {
                NotifyError::Bounced(format!("invalid recipient address '{}': {e}", to.email))
            },
        )?;
        let recipient = Mailbox::new(Some(to.name.clone()), address);

        let email = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(&notification.subject)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport.send(email).await.map_err(|e| {
            if e.is_permanent() {
                NotifyError::Bounced(e.to_string())
            } else {
                NotifyError::Smtp(e.to_string())
            }
        })?;

        tracing::info!(
            channel = "email",
            to = %to.email,
            subject = %notification.subject,
            "notification delivered"
        );

        Ok(())
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }
}
