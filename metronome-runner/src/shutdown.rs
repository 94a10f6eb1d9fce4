//! Signal handling
//!
//! The runner drains in-flight jobs on shutdown, so SIGINT and SIGTERM are
//! translated into a cancellation token instead of terminating the process
//! directly. The health server and the dispatch loop both watch the token.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Returns a token that is cancelled once SIGINT or SIGTERM arrives.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for(SignalKind::terminate(), "SIGTERM") => {}
            _ = wait_for(SignalKind::interrupt(), "SIGINT") => {}
        }

        trigger.cancel();
    });

    token
}

async fn wait_for(kind: SignalKind, name: &str) {
    match signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            info!("received {name}, shutting down");
        }
        Err(err) => {
            // Park this arm so the other signal keeps working.
            error!("failed to install {name} handler: {err}");
            std::future::pending::<()>().await;
        }
    }
}
