//! Minijinja template rendering for alert messages.
//!
//! Renders the subject and body of deadline alerts using minijinja,
//! with access to the recipient, the schedule, and the deadline that
//! triggered the alert. Operators can override both templates through
//! configuration; syntax is validated at startup so a broken override
//! fails fast instead of poisoning every dispatch.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use chrono::Utc;
use duewatch_core::config::AlertingConfig;
use duewatch_core::{AlertEvent, Recipient, ReviewSchedule};

use crate::traits::NotifyError;

/// Subject used when `ALERT_SUBJECT_TEMPLATE` is not set.
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "\
{% if alert.kind == 'OVERDUE' %}\
[OVERDUE] {{ deadline.label | capitalize }} for {{ schedule.semester }}\
{% elif alert.days_before == 0 %}\
{{ deadline.label | capitalize }} for {{ schedule.semester }} is due today\
{% else %}\
{{ deadline.label | capitalize }} for {{ schedule.semester }} due in {{ alert.days_before }} day{{ alert.days_before | pluralize }}\
{% endif %}";

/// Body used when `ALERT_BODY_TEMPLATE` is not set.
pub const DEFAULT_BODY_TEMPLATE: &str = "\
Hello {{ recipient.name }},

{% if alert.kind == 'OVERDUE' %}\
The {{ deadline.label }} deadline for {{ schedule.semester }} passed on {{ deadline.date }} and is now {{ alert.days_overdue }} day{{ alert.days_overdue | pluralize }} overdue.\
{% elif alert.days_before == 0 %}\
The {{ deadline.label }} deadline for {{ schedule.semester }} is today, {{ deadline.date }}.\
{% else %}\
The {{ deadline.label }} deadline for {{ schedule.semester }} is {{ deadline.date }}, {{ alert.days_before }} day{{ alert.days_before | pluralize }} from now.\
{% endif %}
{% if recipient.pending_items > 0 %}\
You have {{ recipient.pending_items }} pending review{{ recipient.pending_items | pluralize }} on this schedule.
{% endif %}\
{% if recipient.role == 'MANAGER' %}\
You are receiving this escalation as the schedule manager.
{% endif %}";

// ── Template context ──────────────────────────────────────────────

/// Context data available to alert templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    /// The reviewer (or manager) the alert is addressed to.
    pub recipient: RecipientContext,
    /// The review schedule the alert belongs to.
    pub schedule: ScheduleContext,
    /// The deadline that triggered the alert.
    pub deadline: DeadlineContext,
    /// Threshold or overdue specifics.
    pub alert: AlertContext,
    /// Current timestamp in RFC 3339 format.
    pub now: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RecipientContext {
    pub name: String,
    /// `"PRIMARY"`, `"BACKUP"`, or `"MANAGER"`.
    pub role: String,
    pub pending_items: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScheduleContext {
    pub id: String,
    pub semester: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeadlineContext {
    /// `"L1"`, `"L2"`, or `"FINAL"`.
    pub kind: String,
    /// Human-readable stage name, e.g. `"first-level review"`.
    pub label: String,
    /// Deadline date in ISO format.
    pub date: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext {
    /// `"THRESHOLD"` or `"OVERDUE"`.
    pub kind: String,
    pub days_before: Option<u32>,
    pub days_overdue: Option<u32>,
}

impl TemplateContext {
    /// Assemble the render context for one alert to one recipient.
    pub fn for_alert(
        schedule: &ReviewSchedule,
        event: &AlertEvent,
        recipient: &Recipient,
    ) -> Self {
        Self {
            recipient: RecipientContext {
                name: recipient.reviewer.name.clone(),
                role: recipient.role.as_str().to_string(),
                pending_items: recipient.pending_items,
            },
            schedule: ScheduleContext {
                id: schedule.id.to_string(),
                semester: schedule.semester.clone(),
            },
            deadline: DeadlineContext {
                kind: event.deadline.as_str().to_string(),
                label: event.deadline.label().to_string(),
                date: event.deadline_date.to_string(),
            },
            alert: AlertContext {
                kind: event.kind.as_str().to_string(),
                days_before: event.days_before,
                days_overdue: event.days_overdue,
            },
            now: Utc::now().to_rfc3339(),
        }
    }
}

// ── Renderer ──────────────────────────────────────────────────────

/// A rendered subject and body, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Renders alert subject and body templates using minijinja.
///
/// A fresh [`minijinja::Environment`] is created per render call since
/// templates are dynamic strings, not pre-registered files.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    subject_template: String,
    body_template: String,
}

impl TemplateRenderer {
    /// Create a renderer with explicit templates. Syntax is not checked
    /// here; call [`validate`](Self::validate) or use
    /// [`from_config`](Self::from_config).
    pub fn new(subject_template: String, body_template: String) -> Self {
        Self {
            subject_template,
            body_template,
        }
    }

    /// Build a renderer from alerting configuration, falling back to the
    /// default templates and validating override syntax up front.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if a configured override does
    /// not parse.
    pub fn from_config(cfg: &AlertingConfig) -> Result<Self, NotifyError> {
        let renderer = Self::new(
            cfg.subject_template
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBJECT_TEMPLATE.to_string()),
            cfg.body_template
                .clone()
                .unwrap_or_else(|| DEFAULT_BODY_TEMPLATE.to_string()),
        );
        renderer.validate()?;
        Ok(renderer)
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        // "s" suffix helper: {{ n }} day{{ n | pluralize }}
        env.add_filter("pluralize", pluralize_filter);

        env
    }

    /// Validate that both templates parse without errors.
    ///
    /// This does not evaluate the templates, it only checks syntax.
    pub fn validate(&self) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(&self.subject_template)
            .map_err(|e| NotifyError::Template(format!("subject template: {e}")))?;
        env.template_from_str(&self.body_template)
            .map_err(|e| NotifyError::Template(format!("body template: {e}")))?;
        Ok(())
    }

    /// Render subject and body for the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if rendering fails.
    pub fn render(&self, ctx: &TemplateContext) -> Result<RenderedMessage, NotifyError> {
        let env = Self::build_env();
        let subject = env
            .render_str(&self.subject_template, ctx)
            .map_err(|e| NotifyError::Template(format!("subject template: {e}")))?;
        let body = env
            .render_str(&self.body_template, ctx)
            .map_err(|e| NotifyError::Template(format!("body template: {e}")))?;
        Ok(RenderedMessage { subject, body })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(
            DEFAULT_SUBJECT_TEMPLATE.to_string(),
            DEFAULT_BODY_TEMPLATE.to_string(),
        )
    }
}

/// Custom filter: `"s"` when the count is not exactly one.
fn pluralize_filter(value: u32) -> String {
    if value == 1 {
        String::new()
    } else {
        "s".to_string()
    }
}
