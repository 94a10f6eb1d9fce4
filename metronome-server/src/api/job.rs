//! Job API Handlers
//!
//! HTTP endpoints for job CRUD and execution history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use metronome_core::domain::execution::JobExecution;
use metronome_core::domain::job::Job;
use metronome_core::dto::job::{CreateJob, UpdateJob};
use metronome_store::JobService;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiResult;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// Pagination query parameters. The limit defaults to 10 and is capped.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Pagination {
    fn limit(&self) -> i64 {
        self.limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    fn offset(&self) -> i64 {
        self.offset.filter(|offset| *offset >= 0).unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    #[serde(default)]
    failed_only: bool,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JobList {
    jobs: Vec<Job>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionList {
    executions: Vec<JobExecution>,
}

/// POST /v1/jobs
/// Register a new job
pub async fn create_job(
    State(service): State<JobService>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = service.create_job(req).await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /v1/jobs/{id}
/// Get job details by id
pub async fn get_job(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = service.get_job(id).await?;

    Ok(Json(job))
}

/// PUT /v1/jobs/{id}
/// Apply a partial update to a job
pub async fn update_job(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
    Json(update): Json<UpdateJob>,
) -> ApiResult<Json<Job>> {
    let job = service.update_job(id, update).await?;

    Ok(Json(job))
}

/// DELETE /v1/jobs/{id}
/// Delete a job; removing a missing id is a success
pub async fn delete_job(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    service.delete_job(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/jobs
/// List jobs, newest id first
pub async fn list_jobs(
    State(service): State<JobService>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<JobList>> {
    let jobs = service
        .list_jobs(pagination.limit(), pagination.offset())
        .await?;

    Ok(Json(JobList { jobs }))
}

/// GET /v1/jobs/{id}/executions
/// List execution records for a job, newest first
pub async fn list_executions(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecutionsQuery>,
) -> ApiResult<Json<ExecutionList>> {
    let pagination = Pagination {
        limit: query.limit,
        offset: query.offset,
    };

    let executions = service
        .get_job_executions(id, query.failed_only, pagination.limit(), pagination.offset())
        .await?;

    Ok(Json(ExecutionList { executions }))
}
