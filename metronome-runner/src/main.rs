//! Metronome Runner
//!
//! A stateless worker that dispatches due jobs from the shared database.
//!
//! Architecture:
//! - Configuration: environment variables with defaults
//! - Executors: HTTP and AMQP capabilities behind a factory, wrapped with retry
//! - Runner: the periodic claim-and-dispatch loop
//! - Health: a minimal API reporting database reachability
//!
//! Any number of runner processes can point at the same database; the
//! claim protocol guarantees each due job is leased to exactly one of them
//! per lease window.

mod config;
mod executor;
mod runner;
mod service;
mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metronome_store::{db, JobService};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::executor::Factory;
use crate::runner::{Runner, RunnerConfig};
use crate::service::DispatchService;
use crate::shutdown::shutdown_token;

const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metronome_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Metronome Runner");

    let config = Config::from_env();
    config.validate()?;
    info!(
        instance_id = %config.instance_id,
        interval = ?config.interval,
        max_concurrent_jobs = config.max_concurrent_jobs,
        job_lock_duration = ?config.job_lock_duration,
        "Loaded configuration"
    );

    let pool = db::create_pool(&config.database_url)
        .await
        .context("failed to create database pool")?;

    info!("Database connection pool created");

    let job_service = JobService::new(pool);

    let client = reqwest::Client::builder()
        .timeout(HTTP_CLIENT_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let runner = Arc::new(Runner::new(RunnerConfig {
        service: Arc::new(job_service.clone()) as Arc<dyn DispatchService>,
        factory: Arc::new(Factory::new(client)),
        instance_id: config.instance_id.clone(),
        interval: config.interval,
        max_concurrent_jobs: config.max_concurrent_jobs,
        job_lock_duration: config.job_lock_duration,
    }));

    runner.start();
    info!("Runner started");

    // Health endpoint, so orchestration layers can probe this process.
    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(job_service);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("Health endpoint listening on {}", config.bind_addr);

    let token = shutdown_token();
    let graceful = {
        let token = token.clone();
        async move { token.cancelled().await }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .await
        .context("health API failed")?;

    info!("Shutting down");
    runner.stop(Some(SHUTDOWN_TIMEOUT)).await;
    info!("Shutdown complete");

    Ok(())
}

/// GET /health
/// Returns 200 iff the database answers.
async fn health_check(State(service): State<JobService>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(service.pool()).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "status": "OK" }))),
        Err(err) => {
            tracing::error!("database status check failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "database ping failed" })),
            )
        }
    }
}
