//! Manual trigger, alert log, and run history endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use duewatch_core::{AlertKind, DeliveryStatus, ReviewerId};
use duewatch_engine::store::ScheduleStore;

use crate::state::{AppState, RunRecord};
use crate::store::AlertLogQuery;

use super::{error_response, store_error_response, ErrorResponse};

// ── Manual trigger ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct TriggerRequest {
    /// Restrict the check to these reviewers. Empty means the whole schedule.
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub reviewer_ids: Vec<ReviewerId>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TriggerResponse {
    pub status: &'static str,
    #[schema(value_type = String)]
    pub schedule_id: Uuid,
}

/// Kick off an on-demand alert check for one schedule. The check runs in
/// the background; its outcome lands in the run history and the alert log.
#[utoipa::path(
    post,
    path = "/api/schedules/{id}/trigger",
    tag = "Alerts",
    params(
        ("id" = String, Path, description = "Schedule ID")
    ),
    request_body = TriggerRequest,
    responses(
        (status = 202, description = "Check accepted", body = TriggerResponse),
        (status = 404, description = "Unknown schedule", body = ErrorResponse),
        (status = 422, description = "Alerting disabled for this schedule", body = ErrorResponse),
        (status = 429, description = "Schedule was triggered too recently", body = ErrorResponse)
    )
)]
pub async fn trigger_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<TriggerRequest>>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let schedule = state
        .schedules
        .schedule_by_id(id)
        .await
        .map_err(store_error_response)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("schedule {id} not found")))?;

    if !schedule.alerting_enabled() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("alerting is disabled for schedule {id}"),
        ));
    }

    if let Err(wait_secs) = state.manual_limiter.check_and_record(id, Utc::now()) {
        warn!(schedule_id = %id, wait_secs, "manual trigger rate-limited");
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: format!("schedule {id} was triggered recently, try again later"),
                retry_after_secs: Some(wait_secs),
            }),
        ));
    }

    let scope = if request.reviewer_ids.is_empty() {
        None
    } else {
        Some(request.reviewer_ids)
    };
    let today = Utc::now()
        .with_timezone(&state.config.alerting.utc_offset())
        .date_naive();

    info!(schedule_id = %id, scoped = scope.is_some(), "manual alert check accepted");
    let task_state = state.clone();
    tokio::spawn(async move {
        match task_state
            .cycle
            .trigger_manual(id, scope.as_deref(), today)
            .await
        {
            Ok(report) => task_state.runs.record(RunRecord::manual(today, report)),
            Err(e) => {
                warn!(schedule_id = %id, error = %e, "manual alert check failed");
                task_state
                    .runs
                    .record(RunRecord::manual_failed(today, e.to_string()));
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "accepted",
            schedule_id: id,
        }),
    ))
}

// ── Alert log ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct AlertListParams {
    /// Filter by schedule.
    #[param(value_type = Option<String>)]
    pub schedule_id: Option<Uuid>,
    /// Filter by recipient reviewer.
    #[param(value_type = Option<String>)]
    pub reviewer_id: Option<Uuid>,
    /// THRESHOLD or OVERDUE.
    pub kind: Option<String>,
    /// Overall delivery status, e.g. SENT or FAILED.
    pub status: Option<String>,
    /// Only entries sent at or after this instant (RFC 3339).
    #[param(value_type = Option<String>)]
    pub since: Option<DateTime<Utc>>,
    /// Maximum entries to return (default 100, max 500).
    pub limit: Option<i64>,
}

/// Browse the append-only alert audit trail, newest first.
#[utoipa::path(
    get,
    path = "/api/alerts",
    tag = "Alerts",
    params(AlertListParams),
    responses(
        (status = 200, description = "Alert log entries, newest first", body = Object),
        (status = 400, description = "Unparseable filter value", body = ErrorResponse)
    )
)]
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertListParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let alert_kind = match params.kind.as_deref() {
        None => None,
        Some(raw) => Some(AlertKind::parse(raw).ok_or_else(|| {
            error_response(StatusCode::BAD_REQUEST, format!("unknown alert kind '{raw}'"))
        })?),
    };
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => Some(DeliveryStatus::parse(raw).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("unknown delivery status '{raw}'"),
            )
        })?),
    };

    let entries = state
        .alert_log
        .list(&AlertLogQuery {
            schedule_id: params.schedule_id,
            reviewer_id: params.reviewer_id,
            alert_kind,
            status,
            since: params.since,
            limit: params.limit,
        })
        .await
        .map_err(store_error_response)?;

    Ok(Json(entries))
}

// ── Run history ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct RunListParams {
    /// Maximum runs to return (default 50).
    pub limit: Option<usize>,
}

/// Recent evaluation runs held in memory, scheduled and manual alike.
#[utoipa::path(
    get,
    path = "/api/runs",
    tag = "Alerts",
    params(RunListParams),
    responses(
        (status = 200, description = "Recent runs, newest first", body = Vec<RunRecord>)
    )
)]
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunListParams>,
) -> Json<Vec<RunRecord>> {
    Json(state.runs.recent(params.limit.unwrap_or(50)))
}
