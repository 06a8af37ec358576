//! Wires config, database, delivery channels, and the engine into one
//! [`AppState`].

use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use duewatch_core::config::Config;
use duewatch_engine::{AlertCycle, EngineConfig};
use duewatch_notify::{
    Dispatcher, EmailNotifier, InAppNotifier, Notifier, RetryPolicy, TemplateRenderer,
};

use crate::db;
use crate::state::{AppState, ManualRateLimiter, RunHistory};
use crate::store::{PgAlertLog, PgInbox, PgScheduleStore};

pub async fn build_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let pool = db::init_pg_pool(&config.postgres).await?;

    let schedules = Arc::new(PgScheduleStore::new(pool.clone()));
    let alert_log = Arc::new(PgAlertLog::new(pool.clone()));
    let inbox = Arc::new(PgInbox::new(pool.clone()));

    let dispatcher = build_dispatcher(&config, inbox.clone())?;
    let cycle = Arc::new(AlertCycle::new(
        schedules.clone(),
        alert_log.clone(),
        dispatcher,
        EngineConfig::from_alerting(&config.alerting),
    ));

    let manual_limiter = ManualRateLimiter::new(config.alerting.manual_interval());

    Ok(Arc::new(AppState {
        config,
        pool,
        cycle,
        schedules,
        alert_log,
        inbox,
        runs: RunHistory::default(),
        manual_limiter,
    }))
}

/// The in-app channel is always available; email joins when SMTP is
/// configured. With SMTP absent, EMAIL deliveries are recorded as failed
/// by the dispatcher rather than silently dropped.
fn build_dispatcher(config: &Config, inbox: Arc<PgInbox>) -> anyhow::Result<Arc<Dispatcher>> {
    let renderer =
        TemplateRenderer::from_config(&config.alerting).context("invalid alert templates")?;

    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(InAppNotifier::new(inbox))];
    if config.smtp.is_configured() {
        let email = EmailNotifier::from_config(&config.smtp).context("invalid SMTP settings")?;
        notifiers.push(Arc::new(email));
    } else {
        warn!("SMTP not configured — EMAIL channel deliveries will be marked failed");
    }

    Ok(Arc::new(Dispatcher::new(
        notifiers,
        renderer,
        RetryPolicy::from_config(&config.dispatch),
        config.dispatch.send_timeout(),
    )))
}
