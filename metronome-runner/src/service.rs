//! Dispatch-facing service seam
//!
//! The runner only needs two operations from the job service: claiming due
//! jobs and finalizing attempts. Keeping them behind a trait lets the loop
//! be exercised with mocks.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metronome_core::domain::job::Job;
use metronome_store::JobService;

/// The slice of the job service the dispatch loop consumes.
#[async_trait]
pub trait DispatchService: Send + Sync {
    /// Atomically claims due jobs, leasing them to `instance_id` until
    /// `lease_until`.
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        instance_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>>;

    /// Advances the job's schedule, releases its lease and records the
    /// attempt's outcome.
    async fn finish_execution(
        &self,
        job: &Job,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()>;
}

#[async_trait]
impl DispatchService for JobService {
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        instance_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>> {
        Ok(JobService::claim_due_jobs(self, now, lease_until, instance_id, limit).await?)
    }

    async fn finish_execution(
        &self,
        job: &Job,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()> {
        Ok(JobService::finish_execution(self, job, started_at, finished_at, error).await?)
    }
}
