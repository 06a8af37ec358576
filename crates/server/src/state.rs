//! Shared application state handed to every request handler.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;

use duewatch_core::{Config, ScheduleId};
use duewatch_engine::{AlertCycle, CycleReport, TickOutcome};

use crate::store::{PgAlertLog, PgInbox, PgScheduleStore};

/// Upper bound on in-memory run history entries.
const MAX_RUN_HISTORY: usize = 500;

pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub cycle: Arc<AlertCycle>,
    pub schedules: Arc<PgScheduleStore>,
    pub alert_log: Arc<PgAlertLog>,
    pub inbox: Arc<PgInbox>,
    pub runs: RunHistory,
    pub manual_limiter: ManualRateLimiter,
}

// ── Run history ─────────────────────────────────────────────────────

/// One recorded evaluation run, scheduled or manual. A skipped entry means
/// the tick found the previous cycle still running.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RunRecord {
    #[schema(value_type = String)]
    pub date: NaiveDate,
    pub trigger: &'static str,
    pub skipped: bool,
    #[schema(value_type = Option<Object>)]
    pub report: Option<CycleReport>,
    pub error: Option<String>,
    #[schema(value_type = String)]
    pub recorded_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn scheduled(date: NaiveDate, outcome: TickOutcome) -> Self {
        let (skipped, report) = match outcome {
            TickOutcome::Completed(report) => (false, Some(report)),
            TickOutcome::AlreadyRunning => (true, None),
        };
        Self {
            date,
            trigger: "scheduled",
            skipped,
            report,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn manual(date: NaiveDate, report: CycleReport) -> Self {
        Self {
            date,
            trigger: "manual",
            skipped: false,
            report: Some(report),
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn manual_failed(date: NaiveDate, error: String) -> Self {
        Self {
            date,
            trigger: "manual",
            skipped: false,
            report: None,
            error: Some(error),
            recorded_at: Utc::now(),
        }
    }
}

/// In-memory ring of recent run records for the `/api/runs` endpoint.
#[derive(Default)]
pub struct RunHistory {
    entries: RwLock<VecDeque<RunRecord>>,
}

impl RunHistory {
    pub fn record(&self, record: RunRecord) {
        let mut entries = self.entries.write().expect("run history lock poisoned");
        entries.push_back(record);
        while entries.len() > MAX_RUN_HISTORY {
            entries.pop_front();
        }
    }

    /// Most recent runs first.
    pub fn recent(&self, limit: usize) -> Vec<RunRecord> {
        let entries = self.entries.read().expect("run history lock poisoned");
        entries.iter().rev().take(limit).cloned().collect()
    }
}

// ── Manual trigger rate limit ───────────────────────────────────────

/// Per-schedule minimum gap between manual trigger requests.
pub struct ManualRateLimiter {
    min_interval: Duration,
    last: Mutex<HashMap<ScheduleId, DateTime<Utc>>>,
}

impl ManualRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Record the trigger if the schedule's gap has elapsed; otherwise
    /// report how many seconds remain until the next allowed trigger.
    pub fn check_and_record(&self, schedule_id: ScheduleId, now: DateTime<Utc>) -> Result<(), u64> {
        let mut last = self.last.lock().expect("rate limiter lock poisoned");
        if let Some(prev) = last.get(&schedule_id) {
            let elapsed = (now - *prev).to_std().unwrap_or_default();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                return Err(wait.as_secs().max(1));
            }
        }
        last.insert(schedule_id, now);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
