//! Process supervision: the observer and the HTTP server run as sibling
//! tasks, and neither outlives the other.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

/// Wait for `stop` or for the first task to finish, then signal shutdown and
/// drain the rest. Returns the first task failure, if any.
pub async fn run_until_stopped(
    mut tasks: JoinSet<anyhow::Result<()>>,
    shutdown: watch::Sender<bool>,
    stop: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    let mut failure = None;
    tokio::select! {
        stopped = stop => {
            stopped?;
            tracing::info!("shutdown requested");
        }
        Some(joined) = tasks.join_next() => {
            tracing::warn!("task exited early, shutting down");
            failure = task_failure(joined);
        }
    }
    let _ = shutdown.send(true);

    while let Some(joined) = tasks.join_next().await {
        if let Some(e) = task_failure(joined) {
            failure.get_or_insert(e);
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn task_failure(joined: Result<anyhow::Result<()>, JoinError>) -> Option<anyhow::Error> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "task failed");
            Some(e)
        }
        Err(e) => {
            tracing::error!(error = %e, "task panicked");
            Some(e.into())
        }
    }
}
