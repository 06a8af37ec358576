//! Alert delivery for review deadline notifications.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - Email (SMTP) and in-app inbox notifier implementations
//! - Minijinja template rendering for alert subjects and bodies
//! - Dispatcher that fans one alert out to all configured channels,
//!   with retry and timeout handling per channel

pub mod dispatcher;
pub mod email;
pub mod inapp;
pub mod retry;
pub mod templating;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use email::EmailNotifier;
pub use inapp::{InAppNotifier, InboxNotification, InboxWriter};
pub use retry::RetryPolicy;
pub use templating::TemplateRenderer;
pub use traits::{Notification, Notifier, NotifyError};
