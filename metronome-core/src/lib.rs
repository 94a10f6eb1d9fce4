//! Metronome Core
//!
//! Core types and abstractions for the Metronome job scheduler.
//!
//! This crate contains:
//! - Domain types: jobs, payloads, execution records, validation
//! - DTOs: create/update requests consumed by the API layer
//! - Schedule parsing and next-run computation

pub mod domain;
pub mod dto;
pub mod error;
pub mod schedule;
