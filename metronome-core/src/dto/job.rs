//! Job create/update requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{AmqpJob, HttpJob, Job, JobKind, JobStatus};

/// Request to register a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(default)]
    pub execute_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cron_schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_job: Option<HttpJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amqp_job: Option<AmqpJob>,
}

impl CreateJob {
    /// Builds a new job with a fresh id, `RUNNING` status and an initial
    /// `next_run` derived from the schedule. The result still has to pass
    /// validation before it is persisted.
    pub fn into_job(self, now: DateTime<Utc>) -> Job {
        let mut job = Job {
            id: Uuid::new_v4(),
            kind: self.kind,
            status: JobStatus::Running,
            execute_at: self.execute_at,
            cron_schedule: self.cron_schedule,
            http_job: self.http_job,
            amqp_job: self.amqp_job,
            created_at: now,
            updated_at: now,
            next_run: None,
        };

        job.set_next_run(now);
        job
    }
}

/// Partial update of an existing job. Absent fields are left untouched;
/// assigning one payload clears the other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateJob {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amqp: Option<AmqpJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_identity_and_schedule() {
        let now = Utc::now();
        let create = CreateJob {
            kind: JobKind::Http,
            execute_at: None,
            cron_schedule: Some("@every 1m".to_string()),
            http_job: None,
            amqp_job: None,
        };

        let job = create.into_job(now);
        assert!(!job.id.is_nil());
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.created_at, now);
        assert_eq!(job.updated_at, now);
        assert_eq!(job.next_run, Some(now + chrono::Duration::minutes(1)));
    }

    #[test]
    fn create_with_past_execute_at_yields_no_next_run() {
        let now = Utc::now();
        let create = CreateJob {
            kind: JobKind::Http,
            execute_at: Some(now - chrono::Duration::minutes(1)),
            cron_schedule: None,
            http_job: None,
            amqp_job: None,
        };

        // Validation rejects such jobs, but next-run derivation alone must
        // leave them dormant rather than due.
        let job = create.into_job(now);
        assert_eq!(job.next_run, None);
    }
}
