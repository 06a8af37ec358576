//! The evaluation cycle.
//!
//! One `AlertCycle` instance owns the whole pipeline for a process: a tick
//! lease so overlapping triggers cannot double-run, a bounded worker pool
//! over schedules, and the guard/reserve/dispatch/finalize sequence per
//! alert. A failure anywhere affects only the schedule (or alert) it
//! happened in; the cycle itself always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use duewatch_core::config::AlertingConfig;
use duewatch_core::{
    AlertEvent, ConfigError, DispatchOutcome, Recipient, ReviewSchedule, ReviewerId, ScheduleId,
};

use crate::dedupe::{self, AlertKey, DedupeGuard, GuardDecision};
use crate::error::EngineError;
use crate::evaluator;
use crate::resolver;
use crate::store::{AlertLog, AlertReservation, ReserveOutcome, ScheduleStore, StoreError};

// ── Dispatch seam ───────────────────────────────────────────────────

/// Delivery backend the cycle hands resolved alerts to. The implementation
/// (channel fan-out, retries, timeouts) lives in the notify crate; the
/// engine only cares about the recorded outcome.
///
/// `alert_id` is the reserved alert log entry the outcome will be recorded
/// against; in-app deliveries link their inbox rows to it.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(
        &self,
        alert_id: Uuid,
        schedule: &ReviewSchedule,
        event: &AlertEvent,
        recipient: &Recipient,
    ) -> DispatchOutcome;
}

// ── Config and reporting ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub worker_concurrency: usize,
    pub escalation_days: i64,
    pub dedupe_window: chrono::Duration,
    pub store_timeout: Duration,
}

impl EngineConfig {
    pub fn from_alerting(alerting: &AlertingConfig) -> Self {
        Self {
            worker_concurrency: alerting.worker_concurrency.max(1),
            escalation_days: alerting.escalation_days,
            dedupe_window: alerting.dedupe_window(),
            store_timeout: alerting.store_timeout(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            escalation_days: 3,
            dedupe_window: chrono::Duration::hours(24),
            store_timeout: Duration::from_secs(10),
        }
    }
}

/// What one cycle run did, for operators and the run history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub schedules_evaluated: usize,
    pub schedules_skipped: usize,
    pub events: usize,
    pub sent: usize,
    pub failed: usize,
    pub suppressed: usize,
    pub conflicts: usize,
    pub store_errors: usize,
}

impl CycleReport {
    fn empty(date: NaiveDate, started_at: DateTime<Utc>) -> Self {
        Self {
            date,
            started_at,
            finished_at: started_at,
            schedules_evaluated: 0,
            schedules_skipped: 0,
            events: 0,
            sent: 0,
            failed: 0,
            suppressed: 0,
            conflicts: 0,
            store_errors: 0,
        }
    }

    fn merge(&mut self, summary: ScheduleSummary) {
        if summary.evaluated {
            self.schedules_evaluated += 1;
        }
        if summary.skipped {
            self.schedules_skipped += 1;
        }
        self.events += summary.events;
        self.sent += summary.sent;
        self.failed += summary.failed;
        self.suppressed += summary.suppressed;
        self.conflicts += summary.conflicts;
        self.store_errors += summary.store_errors;
    }
}

#[derive(Debug, Default)]
struct ScheduleSummary {
    evaluated: bool,
    skipped: bool,
    events: usize,
    sent: usize,
    failed: usize,
    suppressed: usize,
    conflicts: usize,
    store_errors: usize,
}

/// What a tick trigger got back: a finished run, or nothing because the
/// previous run was still going (the tick is skipped, not queued).
#[derive(Debug)]
pub enum TickOutcome {
    Completed(CycleReport),
    AlreadyRunning,
}

// ── The cycle ───────────────────────────────────────────────────────

pub struct AlertCycle {
    schedules: Arc<dyn ScheduleStore>,
    log: Arc<dyn AlertLog>,
    dispatcher: Arc<dyn Dispatch>,
    guard: DedupeGuard,
    config: EngineConfig,
    lease: Mutex<()>,
    shutdown: AtomicBool,
}

impl AlertCycle {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        log: Arc<dyn AlertLog>,
        dispatcher: Arc<dyn Dispatch>,
        config: EngineConfig,
    ) -> Self {
        let guard = DedupeGuard::new(config.dedupe_window);
        Self {
            schedules,
            log,
            dispatcher,
            guard,
            config,
            lease: Mutex::new(()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Stop picking up new schedules. In-flight dispatches run to
    /// completion so their log entries get finalized.
    pub fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        info!("alert engine draining — no new schedules will be picked up");
    }

    /// Run the daily cycle for `today`, unless one is already running.
    ///
    /// The lease makes overlapping ticks skip instead of queue: a skipped
    /// tick is a missed run, logged and visible in the run history, and the
    /// next scheduled tick catches up naturally.
    pub async fn on_tick(&self, today: NaiveDate) -> TickOutcome {
        let lease = match self.lease.try_lock() {
            Ok(lease) => lease,
            Err(_) => {
                warn!(date = %today, "previous evaluation cycle still running — skipping this tick");
                return TickOutcome::AlreadyRunning;
            }
        };
        let report = self.run_cycle(today).await;
        drop(lease);
        TickOutcome::Completed(report)
    }

    /// On-demand run for a single schedule, used by the trigger endpoint
    /// and CLI. Does not take the tick lease: a manual check racing the
    /// daily cycle is resolved per alert by the reservation step.
    pub async fn trigger_manual(
        &self,
        schedule_id: ScheduleId,
        reviewer_scope: Option<&[ReviewerId]>,
        today: NaiveDate,
    ) -> Result<CycleReport, EngineError> {
        let schedule = self
            .timed(self.schedules.schedule_by_id(schedule_id))
            .await?
            .ok_or(EngineError::ScheduleNotFound(schedule_id))?;
        if !schedule.alerting_enabled() {
            return Err(EngineError::Config(ConfigError::Other(
                "alerting is disabled for this schedule".to_string(),
            )));
        }
        let events = evaluator::evaluate_manual(&schedule, today)?;

        let started_at = Utc::now();
        let mut report = CycleReport::empty(today, started_at);
        let mut summary = ScheduleSummary {
            evaluated: true,
            ..ScheduleSummary::default()
        };

        let assignments = self.timed(self.schedules.assignments(schedule.id)).await?;
        let pending = self.timed(self.schedules.pending_counts(schedule.id)).await?;

        for event in &events {
            summary.events += 1;
            let mut recipients = resolver::resolve_recipients(
                &schedule,
                &assignments,
                &pending,
                event,
                self.config.escalation_days,
            );
            if let Some(scope) = reviewer_scope {
                recipients.retain(|r| scope.contains(&r.reviewer.id));
            }
            for recipient in &recipients {
                self.send_one(&schedule, event, recipient, today, &mut summary)
                    .await;
            }
        }

        report.merge(summary);
        report.finished_at = Utc::now();
        info!(
            schedule_id = %schedule_id,
            sent = report.sent,
            suppressed = report.suppressed,
            failed = report.failed,
            "manual alert check finished"
        );
        Ok(report)
    }

    async fn run_cycle(&self, today: NaiveDate) -> CycleReport {
        let started_at = Utc::now();
        info!(date = %today, "alert cycle started");
        let mut report = CycleReport::empty(today, started_at);

        let schedules = match self.timed(self.schedules.active_schedules()).await {
            Ok(schedules) => schedules,
            Err(e) => {
                warn!(error = %e, "failed to load active schedules — cycle aborted");
                report.store_errors += 1;
                report.finished_at = Utc::now();
                return report;
            }
        };

        let summaries: Vec<ScheduleSummary> = stream::iter(schedules)
            .map(|schedule| self.process_schedule(schedule, today))
            .buffer_unordered(self.config.worker_concurrency.max(1))
            .collect()
            .await;
        for summary in summaries {
            report.merge(summary);
        }

        report.finished_at = Utc::now();
        info!(
            date = %today,
            schedules = report.schedules_evaluated,
            events = report.events,
            sent = report.sent,
            failed = report.failed,
            suppressed = report.suppressed,
            conflicts = report.conflicts,
            "alert cycle finished"
        );
        report
    }

    async fn process_schedule(&self, schedule: ReviewSchedule, today: NaiveDate) -> ScheduleSummary {
        let mut summary = ScheduleSummary::default();
        if self.shutdown.load(Ordering::Relaxed) {
            debug!(schedule_id = %schedule.id, "shutdown in progress — schedule not picked up");
            summary.skipped = true;
            return summary;
        }

        let events = match evaluator::evaluate_schedule(&schedule, today) {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    schedule_id = %schedule.id,
                    semester = %schedule.semester,
                    error = %e,
                    "unusable alert config — skipping schedule"
                );
                summary.skipped = true;
                return summary;
            }
        };
        summary.evaluated = true;
        if events.is_empty() {
            return summary;
        }

        let assignments = match self.timed(self.schedules.assignments(schedule.id)).await {
            Ok(assignments) => assignments,
            Err(e) => {
                warn!(schedule_id = %schedule.id, error = %e, "failed to load assignments — schedule skipped this cycle");
                summary.store_errors += 1;
                return summary;
            }
        };
        let pending = match self.timed(self.schedules.pending_counts(schedule.id)).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(schedule_id = %schedule.id, error = %e, "failed to load pending counts — schedule skipped this cycle");
                summary.store_errors += 1;
                return summary;
            }
        };

        for event in &events {
            summary.events += 1;
            let recipients = resolver::resolve_recipients(
                &schedule,
                &assignments,
                &pending,
                event,
                self.config.escalation_days,
            );
            for recipient in &recipients {
                self.send_one(&schedule, event, recipient, today, &mut summary)
                    .await;
            }
        }
        summary
    }

    /// Guard, reserve, dispatch, finalize — for one (event, recipient).
    async fn send_one(
        &self,
        schedule: &ReviewSchedule,
        event: &AlertEvent,
        recipient: &Recipient,
        today: NaiveDate,
        summary: &mut ScheduleSummary,
    ) {
        let key = AlertKey::for_event(event, recipient.reviewer.id);
        let now = Utc::now();

        let decision = match self
            .timed(self.guard.check(self.log.as_ref(), &key, today, now))
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    schedule_id = %key.schedule_id,
                    reviewer_id = %key.reviewer_id,
                    error = %e,
                    "dedup check failed — alert skipped"
                );
                summary.store_errors += 1;
                return;
            }
        };
        if let GuardDecision::Suppress(reason) = decision {
            debug!(
                schedule_id = %key.schedule_id,
                reviewer_id = %key.reviewer_id,
                alert_kind = %key.alert_kind,
                reason = ?reason,
                "alert suppressed"
            );
            summary.suppressed += 1;
            return;
        }

        let reservation = AlertReservation {
            key,
            role: recipient.role,
            dedupe_key: dedupe::dedupe_key(&key, today),
            sent_at: now,
        };
        let entry_id = match self.timed(self.log.reserve(&reservation)).await {
            Ok(ReserveOutcome::Reserved(id)) => id,
            Ok(ReserveOutcome::Duplicate) => {
                debug!(
                    schedule_id = %key.schedule_id,
                    reviewer_id = %key.reviewer_id,
                    "alert already claimed by a concurrent writer"
                );
                summary.conflicts += 1;
                return;
            }
            Err(e) => {
                warn!(
                    schedule_id = %key.schedule_id,
                    reviewer_id = %key.reviewer_id,
                    error = %e,
                    "failed to reserve alert log entry"
                );
                summary.store_errors += 1;
                return;
            }
        };

        let outcome = self
            .dispatcher
            .dispatch(entry_id, schedule, event, recipient)
            .await;
        if outcome.overall().severity() > 0 {
            summary.failed += 1;
        } else {
            summary.sent += 1;
        }

        if let Err(e) = self.timed(self.log.finalize(entry_id, &outcome)).await {
            warn!(entry_id = %entry_id, error = %e, "failed to finalize alert log entry");
            summary.store_errors += 1;
        }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.store_timeout)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
