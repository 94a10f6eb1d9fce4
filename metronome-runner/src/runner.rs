//! The dispatch loop
//!
//! Each runner process owns one long-lived loop: every tick it claims due
//! jobs (leasing them to this instance), then executes each claimed job on
//! its own task under a semaphore capping concurrency. Outcomes are reported
//! back through the job service, which releases the lease and records the
//! attempt. Cross-process coordination happens entirely through the
//! database; nothing here is shared between instances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metronome_core::domain::job::Job;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::executor::{with_retry, ExecutorFactory};
use crate::service::DispatchService;

const CLAIM_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the dispatch loop needs.
pub struct RunnerConfig {
    pub service: Arc<dyn DispatchService>,
    pub factory: Arc<dyn ExecutorFactory>,
    pub instance_id: String,
    pub interval: Duration,
    pub max_concurrent_jobs: usize,
    pub job_lock_duration: Duration,
}

pub struct Runner {
    service: Arc<dyn DispatchService>,
    factory: Arc<dyn ExecutorFactory>,
    instance_id: String,
    interval: Duration,
    job_lock_duration: Duration,
    max_concurrent_jobs: usize,

    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    /// Tracks in-flight job tasks so stop can drain them.
    jobs: TaskTracker,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            service: config.service,
            factory: config.factory,
            instance_id: config.instance_id,
            interval: config.interval,
            job_lock_duration: config.job_lock_duration,
            max_concurrent_jobs: config.max_concurrent_jobs,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            cancel: CancellationToken::new(),
            jobs: TaskTracker::new(),
            loop_handle: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Starts the dispatch loop. Safe to call multiple times; only the
    /// first call starts the loop, the rest are no-ops.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let runner = Arc::clone(self);
        let handle = tokio::spawn(async move { runner.run_loop().await });

        if let Ok(mut slot) = self.loop_handle.lock() {
            *slot = Some(handle);
        }
    }

    async fn run_loop(&self) {
        info!(
            instance_id = %self.instance_id,
            interval = ?self.interval,
            max_concurrent_jobs = self.max_concurrent_jobs,
            "dispatch loop started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.jobs.close();
                    self.jobs.wait().await;
                    info!("dispatch loop stopped");
                    return;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    /// One tick: claim due jobs and hand each to its own task. The claim
    /// call is bounded; a failed tick is logged and retried at the next one.
    async fn tick(&self) {
        let now = Utc::now();
        let lease_until = now + self.job_lock_duration;

        let claimed = tokio::time::timeout(
            CLAIM_TIMEOUT,
            self.service.claim_due_jobs(
                now,
                lease_until,
                &self.instance_id,
                self.max_concurrent_jobs as i64,
            ),
        )
        .await;

        let jobs = match claimed {
            Ok(Ok(jobs)) => jobs,
            Ok(Err(err)) => {
                error!("failed to claim due jobs: {err:#}");
                return;
            }
            Err(_) => {
                error!("claim timed out after {CLAIM_TIMEOUT:?}");
                return;
            }
        };

        if jobs.is_empty() {
            debug!("no due jobs");
            return;
        }

        info!(count = jobs.len(), "dispatching claimed jobs");

        for job in jobs {
            self.execute_job(job).await;
        }
    }

    /// Runs one claimed job on its own task.
    ///
    /// Acquiring the semaphore slot is the only place the runner
    /// back-pressures: when all slots are busy, the remaining jobs of the
    /// tick batch wait here until slots free up.
    async fn execute_job(&self, job: Job) {
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            // The semaphore is never closed; nothing to do if it ever is.
            return;
        };

        let service = Arc::clone(&self.service);
        let factory = Arc::clone(&self.factory);
        let cancel = self.cancel.clone();

        self.jobs.spawn(async move {
            let _permit = permit;

            info!(job_id = %job.id, "executing job");

            let executor = match factory.new_executor(&job, &[with_retry]) {
                Ok(executor) => executor,
                Err(err) => {
                    // Permanent failure: drop the claim, the lease expires
                    // naturally and no execution record is written.
                    error!(job_id = %job.id, error = %err, "failed to build executor");
                    return;
                }
            };

            let started_at = Utc::now();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(job_id = %job.id, "job interrupted by shutdown, leaving lease to expire");
                    return;
                }
                outcome = executor.execute(&job) => outcome,
            };

            let finished_at = Utc::now();
            let error = outcome.err().map(|err| format!("{err:#}"));

            if let Err(err) = service
                .finish_execution(&job, started_at, finished_at, error)
                .await
            {
                error!(job_id = %job.id, "failed to report job execution: {err:#}");
                return;
            }

            info!(job_id = %job.id, "job finished");
        });
    }

    /// Stops the runner: cancels the loop, then waits for it to drain
    /// in-flight jobs, bounded by `timeout` (10 s when unset). On timeout a
    /// warning is logged and the method returns; in-flight tasks are not
    /// forcibly terminated, they finish or get cut by cancellation.
    pub async fn stop(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);

        self.cancel.cancel();

        let handle = match self.loop_handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };

        let Some(handle) = handle else {
            return;
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(_) => info!("runner stopped"),
            Err(_) => warn!("timeout while stopping the runner"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, ExecutorOption, FactoryError};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use metronome_core::domain::job::{JobKind, JobStatus};
    use uuid::Uuid;

    struct MockService {
        jobs: Mutex<Vec<Job>>,
        claim_error: bool,
        finish_error: bool,
        finished: Mutex<Vec<(Uuid, Option<String>)>>,
    }

    impl MockService {
        fn with_jobs(count: usize) -> Arc<Self> {
            let jobs = (0..count).map(|_| bare_job()).collect();
            Arc::new(Self {
                jobs: Mutex::new(jobs),
                claim_error: false,
                finish_error: false,
                finished: Mutex::new(Vec::new()),
            })
        }

        fn remaining(&self) -> usize {
            self.jobs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DispatchService for MockService {
        async fn claim_due_jobs(
            &self,
            _now: DateTime<Utc>,
            _lease_until: DateTime<Utc>,
            _instance_id: &str,
            _limit: i64,
        ) -> Result<Vec<Job>> {
            if self.claim_error {
                bail!("claim error");
            }
            Ok(self.jobs.lock().unwrap().clone())
        }

        async fn finish_execution(
            &self,
            job: &Job,
            _started_at: DateTime<Utc>,
            _finished_at: DateTime<Utc>,
            error: Option<String>,
        ) -> Result<()> {
            if self.finish_error {
                bail!("finish error");
            }
            self.jobs.lock().unwrap().retain(|j| j.id != job.id);
            self.finished.lock().unwrap().push((job.id, error));
            Ok(())
        }
    }

    struct MockExecutor {
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl Executor for MockExecutor {
        async fn execute(&self, _job: &Job) -> Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                bail!("execute error");
            }
            Ok(())
        }
    }

    struct MockFactory {
        factory_error: bool,
        execute_error: bool,
        delay: Duration,
    }

    impl ExecutorFactory for MockFactory {
        fn new_executor(
            &self,
            job: &Job,
            _options: &[ExecutorOption],
        ) -> Result<Box<dyn Executor>, FactoryError> {
            if self.factory_error {
                return Err(FactoryError::MissingPayload {
                    id: job.id,
                    kind: job.kind,
                });
            }
            Ok(Box::new(MockExecutor {
                fail: self.execute_error,
                delay: self.delay,
            }))
        }
    }

    fn bare_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            kind: JobKind::Http,
            status: JobStatus::Running,
            execute_at: None,
            cron_schedule: Some("@every 1m".to_string()),
            http_job: None,
            amqp_job: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            next_run: Some(Utc::now()),
        }
    }

    fn runner(service: Arc<MockService>, factory: MockFactory) -> Arc<Runner> {
        Arc::new(Runner::new(RunnerConfig {
            service: service as Arc<dyn DispatchService>,
            factory: Arc::new(factory) as Arc<dyn ExecutorFactory>,
            instance_id: "test".to_string(),
            interval: Duration::from_millis(20),
            max_concurrent_jobs: 2,
            job_lock_duration: Duration::from_secs(60),
        }))
    }

    fn quiet_factory() -> MockFactory {
        MockFactory {
            factory_error: false,
            execute_error: false,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn processes_claimed_jobs() {
        let service = MockService::with_jobs(3);
        let runner = runner(Arc::clone(&service), quiet_factory());

        runner.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        runner.stop(None).await;

        assert_eq!(service.remaining(), 0);
        let finished = service.finished.lock().unwrap();
        assert!(finished.iter().all(|(_, error)| error.is_none()));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let service = MockService::with_jobs(1);
        let runner = runner(Arc::clone(&service), quiet_factory());

        runner.start();
        runner.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.stop(None).await;

        assert_eq!(service.remaining(), 0);
    }

    #[tokio::test]
    async fn claim_errors_leave_jobs_untouched() {
        let service = Arc::new(MockService {
            jobs: Mutex::new(vec![bare_job(), bare_job(), bare_job()]),
            claim_error: true,
            finish_error: false,
            finished: Mutex::new(Vec::new()),
        });
        let runner = runner(Arc::clone(&service), quiet_factory());

        runner.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.stop(None).await;

        assert_eq!(service.remaining(), 3);
    }

    #[tokio::test]
    async fn finish_errors_leave_jobs_untouched() {
        let service = Arc::new(MockService {
            jobs: Mutex::new(vec![bare_job(), bare_job(), bare_job()]),
            claim_error: false,
            finish_error: true,
            finished: Mutex::new(Vec::new()),
        });
        let runner = runner(Arc::clone(&service), quiet_factory());

        runner.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.stop(None).await;

        assert_eq!(service.remaining(), 3);
    }

    #[tokio::test]
    async fn factory_errors_write_no_execution() {
        let service = MockService::with_jobs(3);
        let runner = runner(
            Arc::clone(&service),
            MockFactory {
                factory_error: true,
                execute_error: false,
                delay: Duration::ZERO,
            },
        );

        runner.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.stop(None).await;

        assert_eq!(service.remaining(), 3);
        assert!(service.finished.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_executions_are_recorded_with_their_error() {
        let service = MockService::with_jobs(2);
        let runner = runner(
            Arc::clone(&service),
            MockFactory {
                factory_error: false,
                execute_error: true,
                delay: Duration::ZERO,
            },
        );

        runner.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        runner.stop(None).await;

        assert_eq!(service.remaining(), 0);
        let finished = service.finished.lock().unwrap();
        assert!(!finished.is_empty());
        assert!(finished
            .iter()
            .all(|(_, error)| error.as_deref() == Some("execute error")));
    }

    #[tokio::test]
    async fn batches_larger_than_the_cap_wait_for_slots() {
        let service = MockService::with_jobs(3);
        let runner = Arc::new(Runner::new(RunnerConfig {
            service: Arc::clone(&service) as Arc<dyn DispatchService>,
            factory: Arc::new(MockFactory {
                factory_error: false,
                execute_error: false,
                delay: Duration::from_millis(30),
            }),
            instance_id: "test".to_string(),
            interval: Duration::from_millis(20),
            max_concurrent_jobs: 1,
            job_lock_duration: Duration::from_secs(60),
        }));

        runner.start();
        tokio::time::sleep(Duration::from_millis(400)).await;
        runner.stop(None).await;

        // With a single slot the batch is worked through sequentially, and
        // every job still completes.
        assert_eq!(service.remaining(), 0);
    }

    #[tokio::test]
    async fn stop_cuts_long_running_jobs_without_recording_them() {
        let service = MockService::with_jobs(1);
        let runner = runner(
            Arc::clone(&service),
            MockFactory {
                factory_error: false,
                execute_error: false,
                delay: Duration::from_secs(60),
            },
        );

        runner.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        runner.stop(Some(Duration::from_secs(5))).await;

        // Cancellation cuts the executor; the runner must not wait for the
        // full job delay and the interrupted attempt leaves no record.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(service.finished.lock().unwrap().is_empty());
        assert_eq!(service.remaining(), 1);
    }
}
