//! Reviewer inbox endpoints.
//!
//! Read and dismiss write through to the owning alert log entry, so the
//! audit trail tracks what the reviewer actually saw.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::store::InboxItem;

use super::{error_response, store_error_response, ErrorResponse};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct InboxListParams {
    /// Also return notifications the reviewer has dismissed.
    #[serde(default)]
    pub include_dismissed: bool,
    /// Maximum notifications to return (default 50, max 200).
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/reviewers/{id}/inbox",
    tag = "Inbox",
    params(
        ("id" = String, Path, description = "Reviewer ID"),
        InboxListParams
    ),
    responses(
        (status = 200, description = "Inbox notifications, newest first", body = Vec<InboxItem>)
    )
)]
pub async fn inbox_list(
    State(state): State<Arc<AppState>>,
    Path(reviewer_id): Path<Uuid>,
    Query(params): Query<InboxListParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let items = state
        .inbox
        .list_for_reviewer(
            reviewer_id,
            params.include_dismissed,
            params.limit.unwrap_or(50),
        )
        .await
        .map_err(store_error_response)?;
    Ok(Json(items))
}

#[utoipa::path(
    post,
    path = "/api/inbox/{id}/read",
    tag = "Inbox",
    params(
        ("id" = String, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification marked read", body = InboxItem),
        (status = 404, description = "Unknown notification", body = ErrorResponse)
    )
)]
pub async fn inbox_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let item = state
        .inbox
        .mark_read(id)
        .await
        .map_err(store_error_response)?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, format!("notification {id} not found"))
        })?;
    Ok(Json(item))
}

#[utoipa::path(
    post,
    path = "/api/inbox/{id}/dismiss",
    tag = "Inbox",
    params(
        ("id" = String, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification dismissed", body = InboxItem),
        (status = 404, description = "Unknown notification", body = ErrorResponse)
    )
)]
pub async fn inbox_dismiss(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let item = state
        .inbox
        .mark_dismissed(id)
        .await
        .map_err(store_error_response)?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, format!("notification {id} not found"))
        })?;
    Ok(Json(item))
}
