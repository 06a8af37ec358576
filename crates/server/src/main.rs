//! duewatch server binary.
//!
//! `serve` runs the HTTP API plus the daily alert scheduler; `run-once` and
//! `trigger` run a single evaluation from the command line and exit.

mod api;
mod db;
mod router;
mod scheduler;
mod startup;
mod state;
mod store;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use duewatch_core::config::Config;
use duewatch_engine::TickOutcome;

use crate::state::AppState;

// ── CLI ─────────────────────────────────────────────────────────────

/// Deadline alert engine for academic review schedules.
#[derive(Parser, Debug)]
#[command(name = "duewatch-server", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and the daily alert scheduler.
    Serve,
    /// Run one evaluation cycle and exit.
    RunOnce {
        /// Evaluation date (YYYY-MM-DD); defaults to today in the
        /// institution timezone.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run an on-demand check for one schedule and exit.
    Trigger {
        /// Schedule to check.
        schedule_id: Uuid,
        /// Restrict the check to specific reviewers (repeatable).
        #[arg(long = "reviewer")]
        reviewers: Vec<Uuid>,
    },
}

// ── Commands ────────────────────────────────────────────────────────

async fn serve(config: Config) -> anyhow::Result<()> {
    config.log_summary();
    let state = startup::build_app_state(config).await?;

    let scheduler_shutdown = Arc::new(Notify::new());
    tokio::spawn(scheduler::run_alert_scheduler(
        state.clone(),
        scheduler_shutdown.clone(),
    ));

    let app = router::build_router(state.clone());
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state, scheduler_shutdown))
        .await?;
    info!("server stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM, stopping the scheduler and draining the
/// engine before axum closes its listener.
async fn shutdown_signal(state: Arc<AppState>, scheduler_shutdown: Arc<Notify>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
    scheduler_shutdown.notify_waiters();
    state.cycle.begin_shutdown();
}

async fn run_once(config: Config, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let state = startup::build_app_state(config).await?;
    let today = date.unwrap_or_else(|| {
        Utc::now()
            .with_timezone(&state.config.alerting.utc_offset())
            .date_naive()
    });

    match state.cycle.on_tick(today).await {
        TickOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        TickOutcome::AlreadyRunning => anyhow::bail!("another evaluation cycle is running"),
    }
}

async fn trigger(config: Config, schedule_id: Uuid, reviewers: Vec<Uuid>) -> anyhow::Result<()> {
    let state = startup::build_app_state(config).await?;
    let today = Utc::now()
        .with_timezone(&state.config.alerting.utc_offset())
        .date_naive();
    let scope = if reviewers.is_empty() {
        None
    } else {
        Some(reviewers.as_slice())
    };

    let report = state.cycle.trigger_manual(schedule_id, scope, today).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    duewatch_core::config::load_dotenv();
    let config = Config::from_env();

    match Cli::parse().command {
        Command::Serve => serve(config).await,
        Command::RunOnce { date } => run_once(config, date).await,
        Command::Trigger {
            schedule_id,
            reviewers,
        } => trigger(config, schedule_id, reviewers).await,
    }
}
