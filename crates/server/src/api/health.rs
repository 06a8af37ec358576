//! Server readiness and scheduler state probe.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::NaiveDate;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    /// Cron expression the daily alert cycle fires on.
    pub alert_cron: String,
    #[schema(value_type = Option<String>)]
    pub last_run_date: Option<NaiveDate>,
    pub last_run_trigger: Option<&'static str>,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let last_run = state.runs.recent(1).into_iter().next();
    Json(HealthResponse {
        status: "ok",
        version: "0.1.0",
        database: if state.pool.is_closed() {
            "closed"
        } else {
            "connected"
        },
        alert_cron: state.config.alerting.cron.clone(),
        last_run_date: last_run.as_ref().map(|run| run.date),
        last_run_trigger: last_run.map(|run| run.trigger),
    })
}
