//! Deadline threshold evaluation.
//!
//! Pure date arithmetic: given a schedule and an evaluation date, decide
//! which (deadline, trigger) pairs fire today. daysUntil counts whole
//! calendar days, so the deadline day itself is 0 and OVERDUE starts
//! strictly after it.

use chrono::NaiveDate;

use duewatch_core::{AlertEvent, ConfigError, ReviewSchedule};

/// Events the daily cycle should emit for one schedule.
///
/// Inactive or alerting-disabled schedules evaluate to nothing. An enabled
/// schedule with an unusable alert config is an error so the cycle can log
/// and skip it rather than silently dropping alerts.
pub fn evaluate_schedule(
    schedule: &ReviewSchedule,
    today: NaiveDate,
) -> Result<Vec<AlertEvent>, ConfigError> {
    if !schedule.alerting_enabled() {
        return Ok(Vec::new());
    }
    schedule.alert_config.validate()?;
    if schedule.deadlines.is_empty() {
        return Err(ConfigError::NoDeadlines);
    }

    let mut events = Vec::new();
    for (kind, deadline_date) in schedule.deadlines.iter() {
        let days_until = (deadline_date - today).num_days();
        if days_until >= 0 {
            if schedule.alert_config.has_threshold(days_until) {
                events.push(AlertEvent::threshold(
                    schedule,
                    kind,
                    deadline_date,
                    days_until as u32,
                ));
            }
        } else if schedule.alert_config.send_overdue {
            events.push(AlertEvent::overdue(
                schedule,
                kind,
                deadline_date,
                (-days_until) as u32,
            ));
        }
    }
    Ok(events)
}

/// On-demand evaluation for a manual trigger: every defined deadline
/// produces an event at its current daysUntil, with no threshold-membership
/// requirement. Deduplication downstream still applies.
pub fn evaluate_manual(
    schedule: &ReviewSchedule,
    today: NaiveDate,
) -> Result<Vec<AlertEvent>, ConfigError> {
    schedule.alert_config.validate()?;
    if schedule.deadlines.is_empty() {
        return Err(ConfigError::NoDeadlines);
    }

    let mut events = Vec::new();
    for (kind, deadline_date) in schedule.deadlines.iter() {
        let days_until = (deadline_date - today).num_days();
        if days_until >= 0 {
            events.push(AlertEvent::threshold(
                schedule,
                kind,
                deadline_date,
                days_until as u32,
            ));
        } else {
            events.push(AlertEvent::overdue(
                schedule,
                kind,
                deadline_date,
                (-days_until) as u32,
            ));
        }
    }
    Ok(events)
}

// ── Tests ────────────────────────────────────────────────────────────
