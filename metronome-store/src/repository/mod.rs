//! Postgres repositories
//!
//! Handles all database operations for jobs and execution records.

pub mod execution;
pub mod job;
