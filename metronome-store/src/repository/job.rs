//! Job repository
//!
//! CRUD over the jobs table plus the atomic due-job claim protocol.

use chrono::{DateTime, Utc};
use metronome_core::domain::job::Job;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

const JOB_COLUMNS: &str = "id, type, status, execute_at, cron_schedule, http_job, amqp_job, \
                           created_at, updated_at, next_run, locked_until, locked_by";

/// Insert a fully-validated job. Fails with `Conflict` on a duplicate id.
pub async fn create(pool: &PgPool, job: &Job) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (
            id, type, status, execute_at, cron_schedule, http_job, amqp_job,
            created_at, updated_at, next_run
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(job.id)
    .bind(job.kind.as_str())
    .bind(job.status.as_str())
    .bind(job.execute_at)
    .bind(&job.cron_schedule)
    .bind(payload_json(&job.http_job)?)
    .bind(payload_json(&job.amqp_job)?)
    .bind(job.created_at)
    .bind(job.updated_at)
    .bind(job.next_run)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(job.id)),
        Err(err) => Err(err.into()),
    }
}

/// Find a job by id.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Job>> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Job::try_from).transpose()
}

/// Replace the mutable fields of a job by id. Idempotent.
pub async fn update(pool: &PgPool, job: &Job) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET type = $1,
            execute_at = $2,
            cron_schedule = $3,
            http_job = $4,
            amqp_job = $5,
            updated_at = $6,
            next_run = $7
        WHERE id = $8
        "#,
    )
    .bind(job.kind.as_str())
    .bind(job.execute_at)
    .bind(&job.cron_schedule)
    .bind(payload_json(&job.http_job)?)
    .bind(payload_json(&job.amqp_job)?)
    .bind(job.updated_at)
    .bind(job.next_run)
    .bind(job.id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a job by id. Deleting a missing id is a success.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// List jobs in descending id order.
pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Job>> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs ORDER BY id DESC LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// Atomically claim due jobs for one runner instance.
///
/// Within a single transaction: select at most `limit` RUNNING jobs whose
/// `next_run` has passed and whose lease is absent or expired, skipping rows
/// locked by concurrent transactions, then write a fresh lease on each
/// selected row. Two runners can therefore never claim the same row in
/// overlapping transactions, and a crashed runner's claim becomes
/// reclaimable once its lease expires.
///
/// No ORDER BY: when more jobs qualify than `limit`, rows come back in
/// database order and callers must not rely on it.
pub async fn claim_due(
    pool: &PgPool,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
    instance_id: &str,
    limit: i64,
) -> Result<Vec<Job>> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE status = 'RUNNING'
          AND next_run <= $1
          AND (locked_until IS NULL OR locked_until <= $1)
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        sqlx::query("UPDATE jobs SET locked_until = $1, locked_by = $2 WHERE id = $3")
            .bind(lease_until)
            .bind(instance_id)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        jobs.push(Job::try_from(row)?);
    }

    tx.commit().await?;

    Ok(jobs)
}

/// Persist the new `next_run` and release the lease. Idempotent.
pub async fn finish(pool: &PgPool, id: Uuid, next_run: Option<DateTime<Utc>>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET next_run = $1,
            locked_until = NULL,
            locked_by = NULL,
            updated_at = now()
        WHERE id = $2
        "#,
    )
    .bind(next_run)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

fn payload_json<T: Serialize>(payload: &Option<T>) -> Result<Option<serde_json::Value>> {
    payload
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|err| StoreError::Decode(err.to_string()))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    kind: String,
    status: String,
    execute_at: Option<DateTime<Utc>>,
    cron_schedule: Option<String>,
    http_job: Option<serde_json::Value>,
    amqp_job: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    next_run: Option<DateTime<Utc>>,
    #[allow(dead_code)]
    locked_until: Option<DateTime<Utc>>,
    #[allow(dead_code)]
    locked_by: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Job> {
        Ok(Job {
            id: row.id,
            kind: row
                .kind
                .parse()
                .map_err(|_| StoreError::Decode(format!("unknown job type {:?}", row.kind)))?,
            status: row
                .status
                .parse()
                .map_err(|_| StoreError::Decode(format!("unknown job status {:?}", row.status)))?,
            execute_at: row.execute_at,
            cron_schedule: row.cron_schedule,
            http_job: decode_payload(row.http_job)?,
            amqp_job: decode_payload(row.amqp_job)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            next_run: row.next_run,
        })
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    value: Option<serde_json::Value>,
) -> Result<Option<T>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| StoreError::Decode(err.to_string()))
}
