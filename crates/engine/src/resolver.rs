//! Recipient resolution.
//!
//! Turns one alert event into the set of reviewers who should hear about it,
//! working over the schedule's department assignments and the pending-work
//! snapshot. The rules, in order:
//! - primary reviewers with pending work are always in;
//! - backups join only close to (or past) the deadline, and only while the
//!   primary is still behind — escalation, not duplication;
//! - nobody with zero pending items gets an alert (nothing to act on);
//! - the schedule manager is added on OVERDUE regardless of pending counts.

use std::collections::{HashMap, HashSet};

use duewatch_core::{
    AlertEvent, Recipient, RecipientRole, ReviewSchedule, ReviewerAssignment, ReviewerId,
};

/// Resolve the recipient list for `event`. A reviewer appearing in several
/// departments is returned once, under the first role that admitted them.
pub fn resolve_recipients(
    schedule: &ReviewSchedule,
    assignments: &[ReviewerAssignment],
    pending: &HashMap<ReviewerId, u32>,
    event: &AlertEvent,
    escalation_days: i64,
) -> Vec<Recipient> {
    let escalating = event.days_until() <= escalation_days;
    let mut seen: HashSet<ReviewerId> = HashSet::new();
    let mut recipients = Vec::new();

    for assignment in assignments {
        let primary_pending = pending.get(&assignment.primary.id).copied().unwrap_or(0);
        if primary_pending > 0 && seen.insert(assignment.primary.id) {
            recipients.push(Recipient {
                reviewer: assignment.primary.clone(),
                role: RecipientRole::Primary,
                pending_items: primary_pending,
            });
        }

        if let Some(backup) = &assignment.backup {
            let backup_pending = pending.get(&backup.id).copied().unwrap_or(0);
            if escalating
                && primary_pending > 0
                && backup_pending > 0
                && seen.insert(backup.id)
            {
                recipients.push(Recipient {
                    reviewer: backup.clone(),
                    role: RecipientRole::Backup,
                    pending_items: backup_pending,
                });
            }
        }
    }

    if event.is_overdue() && seen.insert(schedule.manager.id) {
        recipients.push(Recipient {
            reviewer: schedule.manager.clone(),
            role: RecipientRole::Manager,
            pending_items: pending.get(&schedule.manager.id).copied().unwrap_or(0),
        });
    }

    recipients
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use duewatch_core::{AlertConfig, Channel, DeadlineKind, Deadlines, Reviewer};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn reviewer(name: &str) -> Reviewer {
        Reviewer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.edu", name.to_lowercase()),
        }
    }

    fn make_schedule() -> ReviewSchedule {
        ReviewSchedule {
            id: Uuid::new_v4(),
            semester: "2026-SPRING".to_string(),
            review_start_date: date(2026, 1, 15),
            deadlines: Deadlines {
                l1: Some(date(2026, 3, 8)),
                l2: None,
                final_review: None,
            },
            alert_config: AlertConfig {
                enabled: true,
                days_before: vec![1, 3, 7],
                channels: vec![Channel::Email],
                send_overdue: true,
            },
            is_active: true,
            manager: reviewer("Chair"),
        }
    }

    fn assignment(
        schedule: &ReviewSchedule,
        department: &str,
        primary: &Reviewer,
        backup: Option<&Reviewer>,
    ) -> ReviewerAssignment {
        ReviewerAssignment {
            schedule_id: schedule.id,
            department: department.to_string(),
            primary: primary.clone(),
            backup: backup.cloned(),
        }
    }

    fn threshold_event(schedule: &ReviewSchedule, days_before: u32) -> AlertEvent {
        AlertEvent::threshold(schedule, DeadlineKind::L1, date(2026, 3, 8), days_before)
    }

    fn overdue_event(schedule: &ReviewSchedule, days_overdue: u32) -> AlertEvent {
        AlertEvent::overdue(schedule, DeadlineKind::L1, date(2026, 3, 8), days_overdue)
    }

    #[test]
    fn test_primary_with_pending_work_is_alerted() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let assignments = vec![assignment(&schedule, "Physics", &x, None)];
        let pending = HashMap::from([(x.id, 5)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &threshold_event(&schedule, 7), 3);
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].reviewer.id, x.id);
        assert_eq!(recipients[0].role, RecipientRole::Primary);
        assert_eq!(recipients[0].pending_items, 5);
    }

    #[test]
    fn test_zero_pending_primary_is_excluded() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let assignments = vec![assignment(&schedule, "Physics", &x, None)];
        let pending = HashMap::from([(x.id, 0)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &threshold_event(&schedule, 7), 3);
        assert!(recipients.is_empty());
    }

    #[test]
    fn test_backup_excluded_far_from_deadline() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let y = reviewer("Y");
        let assignments = vec![assignment(&schedule, "Physics", &x, Some(&y))];
        let pending = HashMap::from([(x.id, 5), (y.id, 2)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &threshold_event(&schedule, 7), 3);
        assert_eq!(recipients.len(), 1, "7 days out only the primary is alerted");
        assert_eq!(recipients[0].role, RecipientRole::Primary);
    }

    #[test]
    fn test_backup_joins_at_escalation_boundary() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let y = reviewer("Y");
        let assignments = vec![assignment(&schedule, "Physics", &x, Some(&y))];
        let pending = HashMap::from([(x.id, 5), (y.id, 2)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &threshold_event(&schedule, 3), 3);
        let roles: Vec<RecipientRole> = recipients.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![RecipientRole::Primary, RecipientRole::Backup]);
    }

    #[test]
    fn test_backup_joins_when_overdue() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let y = reviewer("Y");
        let assignments = vec![assignment(&schedule, "Physics", &x, Some(&y))];
        let pending = HashMap::from([(x.id, 1), (y.id, 1)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &overdue_event(&schedule, 2), 3);
        assert!(recipients.iter().any(|r| r.role == RecipientRole::Backup));
    }

    #[test]
    fn test_no_escalation_when_primary_is_done() {
        // Primary finished everything: neither primary nor backup is alerted,
        // even right before the deadline and even though the backup has work.
        let schedule = make_schedule();
        let x = reviewer("X");
        let y = reviewer("Y");
        let assignments = vec![assignment(&schedule, "Physics", &x, Some(&y))];
        let pending = HashMap::from([(x.id, 0), (y.id, 4)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &threshold_event(&schedule, 1), 3);
        assert!(recipients.is_empty());
    }

    #[test]
    fn test_idle_backup_is_excluded() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let y = reviewer("Y");
        let assignments = vec![assignment(&schedule, "Physics", &x, Some(&y))];
        let pending = HashMap::from([(x.id, 5), (y.id, 0)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &threshold_event(&schedule, 1), 3);
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].role, RecipientRole::Primary);
    }

    #[test]
    fn test_manager_added_on_overdue_only() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let assignments = vec![assignment(&schedule, "Physics", &x, None)];
        let pending = HashMap::from([(x.id, 5)]);

        let close = resolve_recipients(
            &schedule,
            &assignments,
            &pending,
            &threshold_event(&schedule, 1),
            3,
        );
        assert!(close.iter().all(|r| r.role != RecipientRole::Manager));

        let overdue =
            resolve_recipients(&schedule, &assignments, &pending, &overdue_event(&schedule, 1), 3);
        let manager: Vec<&Recipient> = overdue
            .iter()
            .filter(|r| r.role == RecipientRole::Manager)
            .collect();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager[0].reviewer.id, schedule.manager.id);
    }

    #[test]
    fn test_manager_bypasses_zero_pending_rule() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let assignments = vec![assignment(&schedule, "Physics", &x, None)];
        // Nobody has pending work recorded — not even the manager.
        let pending = HashMap::from([(x.id, 0)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &overdue_event(&schedule, 1), 3);
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].role, RecipientRole::Manager);
        assert_eq!(recipients[0].pending_items, 0);
    }

    #[test]
    fn test_reviewer_in_two_departments_resolved_once() {
        let schedule = make_schedule();
        let x = reviewer("X");
        let y = reviewer("Y");
        let assignments = vec![
            assignment(&schedule, "Physics", &x, Some(&y)),
            assignment(&schedule, "Chemistry", &x, None),
        ];
        let pending = HashMap::from([(x.id, 3), (y.id, 2)]);

        let recipients =
            resolve_recipients(&schedule, &assignments, &pending, &threshold_event(&schedule, 1), 3);
        let x_entries = recipients.iter().filter(|r| r.reviewer.id == x.id).count();
        assert_eq!(x_entries, 1);
    }
}
