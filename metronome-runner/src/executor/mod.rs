//! Executor capability and factory
//!
//! An executor performs one job attempt. The factory dispatches on the job
//! kind and applies composable decorator options in order; the sole stock
//! option is [`retry::with_retry`].

pub mod amqp;
pub mod http;
pub mod retry;

use anyhow::Result;
use async_trait::async_trait;
use metronome_core::domain::job::{Job, JobKind};
use thiserror::Error;
use uuid::Uuid;

pub use retry::with_retry;

use amqp::AmqpExecutor;
use http::HttpExecutor;

/// Capability for executing a single job attempt.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<()>;
}

/// A decorator applied by the factory after the kind-specific executor is
/// built, e.g. [`with_retry`].
pub type ExecutorOption = fn(Box<dyn Executor>) -> Box<dyn Executor>;

/// Errors building an executor for a job.
///
/// The job kind is a closed enum, so the factory's failure mode is a job
/// whose payload for its kind is absent. The runner treats this as a
/// permanent failure: the claim is logged and dropped, no execution record
/// is written, and the lease expires naturally.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("job {id} has no {kind} payload")]
    MissingPayload { id: Uuid, kind: JobKind },
}

/// Builds executors for jobs.
pub trait ExecutorFactory: Send + Sync {
    fn new_executor(
        &self,
        job: &Job,
        options: &[ExecutorOption],
    ) -> Result<Box<dyn Executor>, FactoryError>;
}

/// Factory over the two stock executors.
pub struct Factory {
    client: reqwest::Client,
}

impl Factory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ExecutorFactory for Factory {
    fn new_executor(
        &self,
        job: &Job,
        options: &[ExecutorOption],
    ) -> Result<Box<dyn Executor>, FactoryError> {
        let mut executor: Box<dyn Executor> = match job.kind {
            JobKind::Http => {
                if job.http_job.is_none() {
                    return Err(FactoryError::MissingPayload {
                        id: job.id,
                        kind: job.kind,
                    });
                }
                Box::new(HttpExecutor::new(self.client.clone()))
            }
            JobKind::Amqp => {
                if job.amqp_job.is_none() {
                    return Err(FactoryError::MissingPayload {
                        id: job.id,
                        kind: job.kind,
                    });
                }
                Box::new(AmqpExecutor)
            }
        };

        for option in options {
            executor = option(executor);
        }

        Ok(executor)
    }
}
