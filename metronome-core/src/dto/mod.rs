//! DTOs consumed by the management API

pub mod job;

pub use job::{CreateJob, UpdateJob};
