//! Execution repository
//!
//! Append-only records of job attempts.

use chrono::{DateTime, Utc};
use metronome_core::domain::execution::{ExecutionStatus, JobExecution};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Append an execution record.
pub async fn create(
    pool: &PgPool,
    job_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: ExecutionStatus,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO job_executions (job_id, start_time, end_time, status, error_message, created_at)
        VALUES ($1, $2, $3, $4, $5, now())
        "#,
    )
    .bind(job_id)
    .bind(start_time)
    .bind(end_time)
    .bind(status.as_str())
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// List execution records for a job, newest first.
pub async fn list_for_job(
    pool: &PgPool,
    job_id: Uuid,
    failed_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<JobExecution>> {
    let query = if failed_only {
        r#"
        SELECT id, job_id, status, start_time, end_time, error_message, created_at
        FROM job_executions
        WHERE job_id = $1 AND status = 'FAILED'
        ORDER BY start_time DESC
        LIMIT $2 OFFSET $3
        "#
    } else {
        r#"
        SELECT id, job_id, status, start_time, end_time, error_message, created_at
        FROM job_executions
        WHERE job_id = $1
        ORDER BY start_time DESC
        LIMIT $2 OFFSET $3
        "#
    };

    let rows = sqlx::query_as::<_, ExecutionRow>(query)
        .bind(job_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(JobExecution::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: i64,
    job_id: Uuid,
    status: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for JobExecution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<JobExecution> {
        Ok(JobExecution {
            id: row.id,
            job_id: row.job_id,
            status: row.status.parse().map_err(|_| {
                StoreError::Decode(format!("unknown execution status {:?}", row.status))
            })?,
            start_time: row.start_time,
            end_time: row.end_time,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}
