//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single
//! `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/alerts", get(api::list_alerts))
        .route("/api/runs", get(api::list_runs))
        .route("/api/schedules/{id}/trigger", post(api::trigger_schedule))
        .route("/api/reviewers/{id}/inbox", get(api::inbox_list))
        .route("/api/inbox/{id}/read", post(api::inbox_read))
        .route("/api/inbox/{id}/dismiss", post(api::inbox_dismiss))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}
