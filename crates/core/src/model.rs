use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

pub type ScheduleId = Uuid;
pub type ReviewerId = Uuid;

// ── Enums ─────────────────────────────────────────────────────────

/// Review stages that carry a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeadlineKind {
    L1,
    L2,
    Final,
}

impl DeadlineKind {
    pub const ALL: [DeadlineKind; 3] = [DeadlineKind::L1, DeadlineKind::L2, DeadlineKind::Final];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeadlineKind::L1 => "L1",
            DeadlineKind::L2 => "L2",
            DeadlineKind::Final => "FINAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "L1" => Some(DeadlineKind::L1),
            "L2" => Some(DeadlineKind::L2),
            "FINAL" => Some(DeadlineKind::Final),
            _ => None,
        }
    }

    /// Human-readable stage name for notification templates.
    pub fn label(&self) -> &'static str {
        match self {
            DeadlineKind::L1 => "first-level review",
            DeadlineKind::L2 => "second-level review",
            DeadlineKind::Final => "final review",
        }
    }
}

impl std::fmt::Display for DeadlineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an alert fired on an approaching deadline or a missed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    Threshold,
    Overdue,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Threshold => "THRESHOLD",
            AlertKind::Overdue => "OVERDUE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "THRESHOLD" => Some(AlertKind::Threshold),
            "OVERDUE" => Some(AlertKind::Overdue),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery channels a schedule can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    InApp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::InApp => "IN_APP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EMAIL" => Some(Channel::Email),
            "IN_APP" => Some(Channel::InApp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-channel delivery state. `Read` and `Dismissed` only apply to in-app
/// notifications after the recipient interacts with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Bounced,
    Read,
    Dismissed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Bounced => "BOUNCED",
            DeliveryStatus::Read => "READ",
            DeliveryStatus::Dismissed => "DISMISSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(DeliveryStatus::Pending),
            "SENT" => Some(DeliveryStatus::Sent),
            "FAILED" => Some(DeliveryStatus::Failed),
            "BOUNCED" => Some(DeliveryStatus::Bounced),
            "READ" => Some(DeliveryStatus::Read),
            "DISMISSED" => Some(DeliveryStatus::Dismissed),
            _ => None,
        }
    }

    /// Ordering for worst-case aggregation across channels.
    /// BOUNCED outranks FAILED outranks PENDING; everything delivered is 0.
    pub fn severity(&self) -> u8 {
        match self {
            DeliveryStatus::Bounced => 3,
            DeliveryStatus::Failed => 2,
            DeliveryStatus::Pending => 1,
            DeliveryStatus::Sent | DeliveryStatus::Read | DeliveryStatus::Dismissed => 0,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a reviewer ended up on an alert's recipient list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientRole {
    Primary,
    Backup,
    Manager,
}

impl RecipientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientRole::Primary => "PRIMARY",
            RecipientRole::Backup => "BACKUP",
            RecipientRole::Manager => "MANAGER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRIMARY" => Some(RecipientRole::Primary),
            "BACKUP" => Some(RecipientRole::Backup),
            "MANAGER" => Some(RecipientRole::Manager),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Schedules and reviewers ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: ReviewerId,
    pub name: String,
    pub email: String,
}

/// The deadline set of a review cycle. A schedule defines at least one
/// stage; absent stages are skipped during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    pub l1: Option<NaiveDate>,
    pub l2: Option<NaiveDate>,
    #[serde(rename = "final")]
    pub final_review: Option<NaiveDate>,
}

impl Deadlines {
    pub fn get(&self, kind: DeadlineKind) -> Option<NaiveDate> {
        match kind {
            DeadlineKind::L1 => self.l1,
            DeadlineKind::L2 => self.l2,
            DeadlineKind::Final => self.final_review,
        }
    }

    /// Defined deadlines in stage order.
    pub fn iter(&self) -> impl Iterator<Item = (DeadlineKind, NaiveDate)> {
        [
            (DeadlineKind::L1, self.l1),
            (DeadlineKind::L2, self.l2),
            (DeadlineKind::Final, self.final_review),
        ]
        .into_iter()
        .filter_map(|(kind, date)| date.map(|d| (kind, d)))
    }

    pub fn is_empty(&self) -> bool {
        self.l1.is_none() && self.l2.is_none() && self.final_review.is_none()
    }
}

/// Per-schedule alerting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Days-before-deadline marks at which THRESHOLD alerts fire (e.g. [1, 3, 7]).
    pub days_before: Vec<u32>,
    pub channels: Vec<Channel>,
    pub send_overdue: bool,
}

impl AlertConfig {
    /// A disabled config is always valid; an enabled one must be actionable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        let mut seen = std::collections::HashSet::new();
        for d in &self.days_before {
            if !seen.insert(*d) {
                return Err(ConfigError::Thresholds(format!("duplicate threshold {}", d)));
            }
        }
        let mut seen_channels = std::collections::HashSet::new();
        for c in &self.channels {
            if !seen_channels.insert(*c) {
                return Err(ConfigError::Other(format!("duplicate channel {}", c)));
            }
        }
        Ok(())
    }

    pub fn has_threshold(&self, days_until: i64) -> bool {
        days_until >= 0 && self.days_before.iter().any(|d| *d as i64 == days_until)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSchedule {
    pub id: ScheduleId,
    /// Semester label like "2026-SPRING".
    pub semester: String,
    pub review_start_date: NaiveDate,
    pub deadlines: Deadlines,
    pub alert_config: AlertConfig,
    pub is_active: bool,
    pub manager: Reviewer,
}

impl ReviewSchedule {
    pub fn alerting_enabled(&self) -> bool {
        self.is_active && self.alert_config.enabled
    }
}

/// Maps a department within a schedule to its primary (and optional backup)
/// reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerAssignment {
    pub schedule_id: ScheduleId,
    pub department: String,
    pub primary: Reviewer,
    pub backup: Option<Reviewer>,
}

// ── Alert events and recipients ───────────────────────────────────

/// A single (deadline, trigger) pair produced by the evaluator. One event
/// fans out to one alert per resolved recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub schedule_id: ScheduleId,
    pub semester: String,
    pub kind: AlertKind,
    pub deadline: DeadlineKind,
    pub deadline_date: NaiveDate,
    /// Matched threshold for THRESHOLD events, None for OVERDUE.
    pub days_before: Option<u32>,
    /// Days past the deadline for OVERDUE events, None for THRESHOLD.
    pub days_overdue: Option<u32>,
}

impl AlertEvent {
    pub fn threshold(
        schedule: &ReviewSchedule,
        deadline: DeadlineKind,
        deadline_date: NaiveDate,
        days_before: u32,
    ) -> Self {
        Self {
            schedule_id: schedule.id,
            semester: schedule.semester.clone(),
            kind: AlertKind::Threshold,
            deadline,
            deadline_date,
            days_before: Some(days_before),
            days_overdue: None,
        }
    }

    pub fn overdue(
        schedule: &ReviewSchedule,
        deadline: DeadlineKind,
        deadline_date: NaiveDate,
        days_overdue: u32,
    ) -> Self {
        Self {
            schedule_id: schedule.id,
            semester: schedule.semester.clone(),
            kind: AlertKind::Overdue,
            deadline,
            deadline_date,
            days_before: None,
            days_overdue: Some(days_overdue),
        }
    }

    pub fn is_overdue(&self) -> bool {
        self.kind == AlertKind::Overdue
    }

    /// Signed distance to the deadline: positive before, negative after.
    pub fn days_until(&self) -> i64 {
        match self.kind {
            AlertKind::Threshold => self.days_before.map(i64::from).unwrap_or(0),
            AlertKind::Overdue => -self.days_overdue.map(i64::from).unwrap_or(0),
        }
    }
}

/// A reviewer resolved as the target of one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub reviewer: Reviewer,
    pub role: RecipientRole,
    /// Pending items the recipient has on the schedule (0 for managers
    /// pulled in by escalation).
    pub pending_items: u32,
}

// ── Alert log ─────────────────────────────────────────────────────

/// Outcome of one delivery channel for one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDelivery {
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub error: Option<String>,
}

/// What the dispatcher reports back after attempting every configured
/// channel for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub channels: Vec<ChannelDelivery>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    /// Worst-case status across channels: one bounced channel marks the
    /// whole alert BOUNCED even if the other channel was delivered.
    pub fn overall(&self) -> DeliveryStatus {
        self.channels
            .iter()
            .map(|c| c.status)
            .max_by_key(|s| s.severity())
            .unwrap_or(DeliveryStatus::Failed)
    }
}

/// One row of the append-only alert audit trail. Exactly one entry exists
/// per (recipient, alert occurrence), regardless of channel count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    pub id: Uuid,
    pub schedule_id: ScheduleId,
    pub reviewer_id: ReviewerId,
    pub recipient_role: RecipientRole,
    pub alert_kind: AlertKind,
    pub deadline_kind: DeadlineKind,
    /// Matched threshold for THRESHOLD alerts, NULL for OVERDUE.
    pub days_before: Option<i32>,
    pub channels: Vec<ChannelDelivery>,
    pub overall_status: DeliveryStatus,
    pub error: Option<String>,
    pub dedupe_key: String,
    pub sent_at: DateTime<Utc>,
}

// ── Tests ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(channel: Channel, status: DeliveryStatus) -> ChannelDelivery {
        ChannelDelivery {
            channel,
            status,
            attempts: 1,
            error: None,
        }
    }

    #[test]
    fn test_overall_status_worst_case_bounced_wins() {
        let outcome = DispatchOutcome {
            channels: vec![
                delivery(Channel::InApp, DeliveryStatus::Sent),
                delivery(Channel::Email, DeliveryStatus::Bounced),
            ],
            error: None,
        };
        assert_eq!(outcome.overall(), DeliveryStatus::Bounced);
    }

    #[test]
    fn test_overall_status_failed_over_sent() {
        let outcome = DispatchOutcome {
            channels: vec![
                delivery(Channel::Email, DeliveryStatus::Failed),
                delivery(Channel::InApp, DeliveryStatus::Sent),
            ],
            error: None,
        };
        assert_eq!(outcome.overall(), DeliveryStatus::Failed);
    }

    #[test]
    fn test_overall_status_all_sent() {
        let outcome = DispatchOutcome {
            channels: vec![
                delivery(Channel::Email, DeliveryStatus::Sent),
                delivery(Channel::InApp, DeliveryStatus::Sent),
            ],
            error: None,
        };
        assert_eq!(outcome.overall(), DeliveryStatus::Sent);
    }

    #[test]
    fn test_overall_status_no_channels_is_failed() {
        let outcome = DispatchOutcome {
            channels: vec![],
            error: None,
        };
        assert_eq!(outcome.overall(), DeliveryStatus::Failed);
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&Channel::InApp).unwrap(), "\"IN_APP\"");
        assert_eq!(serde_json::to_string(&DeadlineKind::Final).unwrap(), "\"FINAL\"");
        assert_eq!(
            serde_json::to_string(&AlertKind::Threshold).unwrap(),
            "\"THRESHOLD\""
        );
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::Bounced).unwrap(),
            "\"BOUNCED\""
        );
    }

    #[test]
    fn test_enum_parse_matches_as_str() {
        assert_eq!(Channel::parse("IN_APP"), Some(Channel::InApp));
        assert_eq!(DeadlineKind::parse("FINAL"), Some(DeadlineKind::Final));
        assert_eq!(DeliveryStatus::parse("DISMISSED"), Some(DeliveryStatus::Dismissed));
        assert_eq!(RecipientRole::parse("nope"), None);
    }

    #[test]
    fn test_alert_config_rejects_empty_channels() {
        let config = AlertConfig {
            enabled: true,
            days_before: vec![7, 3, 1],
            channels: vec![],
            send_overdue: true,
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoChannels)));
    }

    #[test]
    fn test_alert_config_rejects_duplicate_thresholds() {
        let config = AlertConfig {
            enabled: true,
            days_before: vec![3, 3],
            channels: vec![Channel::Email],
            send_overdue: false,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Thresholds(_))));
    }

    #[test]
    fn test_alert_config_rejects_duplicate_channels() {
        let config = AlertConfig {
            enabled: true,
            days_before: vec![7],
            channels: vec![Channel::Email, Channel::Email],
            send_overdue: false,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Other(_))));
    }

    #[test]
    fn test_alert_config_disabled_is_always_valid() {
        let config = AlertConfig {
            enabled: false,
            days_before: vec![],
            channels: vec![],
            send_overdue: false,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_has_threshold_ignores_negative_days() {
        let config = AlertConfig {
            enabled: true,
            days_before: vec![0, 3],
            channels: vec![Channel::Email],
            send_overdue: true,
        };
        assert!(config.has_threshold(0));
        assert!(config.has_threshold(3));
        assert!(!config.has_threshold(-3));
        assert!(!config.has_threshold(5));
    }

    #[test]
    fn test_deadlines_iter_skips_missing_stages() {
        let deadlines = Deadlines {
            l1: NaiveDate::from_ymd_opt(2026, 3, 1),
            l2: None,
            final_review: NaiveDate::from_ymd_opt(2026, 5, 1),
        };
        let kinds: Vec<DeadlineKind> = deadlines.iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![DeadlineKind::L1, DeadlineKind::Final]);
    }

    #[test]
    fn test_days_until_sign_convention() {
        let schedule = ReviewSchedule {
            id: Uuid::new_v4(),
            semester: "2026-SPRING".to_string(),
            review_start_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            deadlines: Deadlines {
                l1: NaiveDate::from_ymd_opt(2026, 3, 1),
                l2: None,
                final_review: None,
            },
            alert_config: AlertConfig {
                enabled: true,
                days_before: vec![3],
                channels: vec![Channel::Email],
                send_overdue: true,
            },
            is_active: true,
            manager: Reviewer {
                id: Uuid::new_v4(),
                name: "M. Chair".to_string(),
                email: "chair@example.edu".to_string(),
            },
        };
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let ahead = AlertEvent::threshold(&schedule, DeadlineKind::L1, date, 3);
        assert_eq!(ahead.days_until(), 3);
        let behind = AlertEvent::overdue(&schedule, DeadlineKind::L1, date, 2);
        assert_eq!(behind.days_until(), -2);
        assert!(behind.is_overdue());
    }
}
