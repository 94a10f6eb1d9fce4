//! API Module
//!
//! HTTP management surface for jobs and execution records.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    routing::get,
    Router,
};
use metronome_store::JobService;
use tower_http::trace::TraceLayer;

/// Create the main API router with all endpoints
pub fn create_router(service: JobService) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/v1/jobs", get(job::list_jobs).post(job::create_job))
        .route(
            "/v1/jobs/{id}",
            get(job::get_job).put(job::update_job).delete(job::delete_job),
        )
        .route("/v1/jobs/{id}/executions", get(job::list_executions))
        // Add state and middleware
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
