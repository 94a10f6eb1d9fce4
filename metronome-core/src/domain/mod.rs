//! Domain types
//!
//! Core business entities shared by the store, the API server and the runner.

pub mod execution;
pub mod job;

pub use execution::{ExecutionStatus, JobExecution};
pub use job::{AmqpJob, Auth, AuthKind, BodyEncoding, HttpJob, Job, JobKind, JobStatus};
