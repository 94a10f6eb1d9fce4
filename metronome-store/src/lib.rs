//! Metronome Store
//!
//! The only crate with knowledge of persistence. Contains the Postgres
//! repositories for jobs and executions, the atomic due-job claim protocol,
//! pool construction and bootstrap migrations, and the `JobService`
//! orchestration layer shared by the API server and the runner.

pub mod db;
pub mod error;
pub mod repository;
pub mod service;

pub use error::StoreError;
pub use service::job::JobService;
