//! Health Check API Handler

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metronome_store::JobService;

/// GET /health
/// Returns 200 iff the database answers.
pub async fn health_check(State(service): State<JobService>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(service.pool()).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "status": "OK" }))),
        Err(err) => {
            tracing::error!("database status check failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "database ping failed" })),
            )
        }
    }
}
