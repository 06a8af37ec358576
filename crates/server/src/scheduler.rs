//! Daily alert scheduler.
//!
//! Polls a coarse interval and fires the evaluation cycle when the configured
//! cron expression has a trigger time between the previous check and now. The
//! cron is evaluated in the institution's timezone, so "07:00" means 07:00
//! local wall-clock wherever the institution sits, and the cycle's evaluation
//! date is the local calendar date at fire time.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::state::{AppState, RunRecord};

/// How often we check whether the cron has come due. Coarse enough to be
/// free, fine enough that a run starts within a minute of its cron time.
const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Accepts standard 5-field cron as well as the 6-field form with seconds.
fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    if expr.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {expr}"))
    } else {
        Schedule::from_str(expr)
    }
}

/// Did the schedule have a fire time in `(last, now]`?
fn fired_between(
    schedule: &Schedule,
    last: DateTime<FixedOffset>,
    now: DateTime<FixedOffset>,
) -> bool {
    schedule
        .after(&last)
        .next()
        .map(|next| next <= now)
        .unwrap_or(false)
}

/// Long-running scheduler task. Returns when `shutdown` is notified, or
/// immediately if the cron expression does not parse.
pub async fn run_alert_scheduler(state: Arc<AppState>, shutdown: Arc<Notify>) {
    let expr = state.config.alerting.cron.clone();
    let schedule = match parse_cron(&expr) {
        Ok(schedule) => schedule,
        Err(e) => {
            error!(cron = %expr, error = %e, "invalid alert cron expression — scheduler disabled");
            return;
        }
    };
    let offset = state.config.alerting.utc_offset();

    if let Some(next) = schedule.upcoming(offset).next() {
        info!(cron = %expr, next_run = %next, "alert scheduler started");
    }

    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_check = Utc::now().with_timezone(&offset);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.notified() => {
                info!("alert scheduler stopping");
                return;
            }
        }

        let now = Utc::now().with_timezone(&offset);
        if fired_between(&schedule, last_check, now) {
            let today = now.date_naive();
            info!(date = %today, "daily alert cycle due");
            let outcome = state.cycle.on_tick(today).await;
            state.runs.record(RunRecord::scheduled(today, outcome));
        }
        last_check = now;
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn offset_utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(offset: FixedOffset, h: u32, m: u32) -> DateTime<FixedOffset> {
        offset.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_cron_five_field() {
        assert!(parse_cron("0 7 * * *").is_ok());
    }

    #[test]
    fn test_parse_cron_six_field() {
        assert!(parse_cron("0 0 7 * * *").is_ok());
    }

    #[test]
    fn test_parse_cron_invalid() {
        assert!(parse_cron("not a cron").is_err());
        assert!(parse_cron("99 99 * * *").is_err());
    }

    #[test]
    fn test_parse_cron_daily_morning_fires_at_seven() {
        let schedule = parse_cron("0 7 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "07:00:00");
    }

    #[test]
    fn test_fired_between_detects_crossing() {
        let schedule = parse_cron("0 7 * * *").unwrap();
        let offset = offset_utc();
        assert!(fired_between(&schedule, at(offset, 6, 59), at(offset, 7, 1)));
    }

    #[test]
    fn test_fired_between_no_crossing() {
        let schedule = parse_cron("0 7 * * *").unwrap();
        let offset = offset_utc();
        assert!(!fired_between(&schedule, at(offset, 7, 1), at(offset, 7, 30)));
        assert!(!fired_between(&schedule, at(offset, 5, 0), at(offset, 6, 0)));
    }

    #[test]
    fn test_fired_between_respects_offset() {
        // 07:00 in UTC+8 is 23:00 UTC the previous day; the same wall-clock
        // window must fire regardless of which offset expresses it.
        let schedule = parse_cron("0 7 * * *").unwrap();
        let plus8 = FixedOffset::east_opt(8 * 3600).unwrap();
        assert!(fired_between(&schedule, at(plus8, 6, 59), at(plus8, 7, 1)));
    }
}
