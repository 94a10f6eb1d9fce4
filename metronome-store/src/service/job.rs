//! Job service
//!
//! Thin coordination over the repositories: validates jobs, computes
//! next-run times, and records execution outcomes. Shared by the management
//! API and the runner.

use chrono::{DateTime, Utc};
use metronome_core::domain::execution::{ExecutionStatus, JobExecution};
use metronome_core::domain::job::Job;
use metronome_core::dto::job::{CreateJob, UpdateJob};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::repository;

#[derive(Clone)]
pub struct JobService {
    pool: PgPool,
}

impl JobService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates a new job from the given request and returns it.
    pub async fn create_job(&self, create: CreateJob) -> Result<Job> {
        let now = Utc::now();
        let job = create.into_job(now);
        job.validate(now)?;

        repository::job::create(&self.pool, &job).await?;

        tracing::info!(job_id = %job.id, kind = %job.kind, "job created");

        Ok(job)
    }

    /// Returns the job with the given id.
    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        repository::job::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Applies a partial update to the job with the given id.
    pub async fn update_job(&self, id: Uuid, update: UpdateJob) -> Result<Job> {
        let mut job = self.get_job(id).await?;

        let now = Utc::now();
        job.apply_update(update, now);
        job.validate(now)?;

        repository::job::update(&self.pool, &job).await?;

        Ok(job)
    }

    /// Deletes the job with the given id. Idempotent.
    pub async fn delete_job(&self, id: Uuid) -> Result<()> {
        repository::job::delete(&self.pool, id).await
    }

    /// Lists jobs in descending id order.
    pub async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<Job>> {
        repository::job::list(&self.pool, limit, offset).await
    }

    /// Lists execution records for a job, newest first.
    pub async fn get_job_executions(
        &self,
        id: Uuid,
        failed_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobExecution>> {
        repository::execution::list_for_job(&self.pool, id, failed_only, limit, offset).await
    }

    /// Atomically claims due jobs, leasing them to `instance_id` until
    /// `lease_until`.
    pub async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        instance_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>> {
        repository::job::claim_due(&self.pool, now, lease_until, instance_id, limit).await
    }

    /// Finalizes one job attempt: advances `next_run` (one-shot jobs go
    /// dormant), releases the lease, then appends an execution record.
    ///
    /// If releasing the lease fails, no execution record is written — the
    /// job is still leased and will be retried once the lease expires, and a
    /// record would wrongly suggest the attempt was accounted for. In that
    /// case the attempt's own execution error (if any) is returned instead
    /// of the persistence failure.
    pub async fn finish_execution(
        &self,
        job: &Job,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()> {
        let mut job = job.clone();
        job.set_next_run(Utc::now());

        if let Err(finish_err) = repository::job::finish(&self.pool, job.id, job.next_run).await {
            tracing::warn!(job_id = %job.id, "failed to release job lease: {finish_err}");
            return match error {
                Some(message) => Err(StoreError::ExecutionFailure(message)),
                None => Ok(()),
            };
        }

        let status = match &error {
            None => ExecutionStatus::Successful,
            Some(_) => ExecutionStatus::Failed,
        };

        repository::execution::create(
            &self.pool,
            job.id,
            started_at,
            finished_at,
            status,
            error.as_deref(),
        )
        .await?;

        Ok(())
    }
}
