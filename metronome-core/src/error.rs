//! Validation errors for job definitions

use thiserror::Error;

/// Errors produced while validating a job definition.
///
/// Every variant maps to a user-visible 400 at the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("job type must be either HTTP or AMQP")]
    InvalidJobType,

    #[error("job status must be either RUNNING or STOPPED")]
    InvalidJobStatus,

    #[error("invalid execution status")]
    InvalidExecutionStatus,

    #[error("job cannot have both HTTP and AMQP payloads defined")]
    ConflictingPayloads,

    #[error("job must have exactly one of execute_at and cron_schedule defined")]
    InvalidSchedule,

    #[error("invalid cron schedule")]
    InvalidCronSchedule,

    #[error("execute_at must be in the future")]
    ExecuteAtInPast,

    #[error("HTTP payload must be defined for HTTP jobs")]
    HttpJobNotDefined,

    #[error("HTTP job URL cannot be empty")]
    EmptyHttpUrl,

    #[error("HTTP job method cannot be empty")]
    EmptyHttpMethod,

    #[error("AMQP payload must be defined for AMQP jobs")]
    AmqpJobNotDefined,

    #[error("exchange must be defined for AMQP jobs")]
    EmptyExchange,

    #[error("routing key must be defined for AMQP jobs")]
    EmptyRoutingKey,

    #[error("username must be defined for basic auth")]
    EmptyUsername,

    #[error("password must be defined for basic auth")]
    EmptyPassword,

    #[error("bearer token must be defined for bearer auth")]
    EmptyBearerToken,
}
