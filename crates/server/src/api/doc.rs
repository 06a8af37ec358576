//! OpenAPI documentation aggregator.
//!
//! Collects all `#[utoipa::path]`-annotated handlers and `ToSchema`-derived
//! types into a single OpenAPI spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "duewatch API",
        version = "0.1.0",
        description = "Deadline alert scheduling and delivery for academic review cycles.",
    ),
    tags(
        (name = "Health", description = "Server readiness"),
        (name = "Alerts", description = "Manual trigger, alert audit log, and run history"),
        (name = "Inbox", description = "Reviewer in-app notifications"),
    ),
    paths(
        // Health
        crate::api::health::health,
        // Alerts
        crate::api::alerts::trigger_schedule,
        crate::api::alerts::list_alerts,
        crate::api::alerts::list_runs,
        // Inbox
        crate::api::inbox::inbox_list,
        crate::api::inbox::inbox_read,
        crate::api::inbox::inbox_dismiss,
    ),
    components(schemas(
        // Shared
        crate::api::ErrorResponse,
        // Health
        crate::api::health::HealthResponse,
        // Alerts
        crate::api::alerts::TriggerRequest,
        crate::api::alerts::TriggerResponse,
        crate::state::RunRecord,
        // Inbox
        crate::store::InboxItem,
    ))
)]
pub struct ApiDoc;
