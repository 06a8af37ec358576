//! HTTP endpoint modules.
//!
//! Each sub-module owns a single responsibility area. Shared error shapes
//! and the store-error mapping live here in mod.rs.

mod alerts;
pub mod doc;
mod health;
mod inbox;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use duewatch_engine::store::StoreError;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Only set on 429 responses: seconds until the next trigger is allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

pub(crate) fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            retry_after_secs: None,
        }),
    )
}

/// Store failures map to 503 when the database cannot be reached and 500
/// when it answered with something unusable. The detail goes to the log,
/// not the client.
pub(crate) fn store_error_response(e: StoreError) -> (StatusCode, Json<ErrorResponse>) {
    warn!(error = %e, "store error while serving request");
    match e {
        StoreError::Unavailable(_) | StoreError::Timeout(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
        StoreError::Query(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
    }
}

// ── Re-exports ───────────────────────────────────────────────────
// Preserves flat `api::foo` import paths used by router registration.

pub use alerts::{list_alerts, list_runs, trigger_schedule};
pub use health::health;
pub use inbox::{inbox_dismiss, inbox_list, inbox_read};
