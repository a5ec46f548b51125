// ABOUTME: Keeps an enabled session's worker running until shutdown or until the worker dies.
// ABOUTME: Always closes the session; a worker that exits on its own is reported as an error.

use anyhow::{Context, Result};
use mirai_core::Session;
use std::future::Future;

/// Run until `shutdown` resolves or the worker exits, then close the session.
///
/// Returns the worker's failure when it stopped without being asked to.
pub async fn run_until_shutdown<F>(session: &mut Session, shutdown: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let worker_exited = tokio::select! {
        signal = shutdown => {
            signal?;
            false
        }
        finished = session.worker_finished() => {
            finished.context("No event worker to wait on")?;
            true
        }
    };

    if !worker_exited {
        tracing::info!("Shutting down");
        return session.close(false).await.context("Failed to close session");
    }

    let outcome = session.stop_worker().await;
    // ignore_errors: the worker outcome is what gets reported
    if let Err(e) = session.close(true).await {
        tracing::warn!(error = %e, "Failed to close session after worker exit");
    }

    match outcome {
        Err(e) => {
            tracing::error!(error = %e, "Event worker stopped unexpectedly");
            Err(e).context("Event worker stopped unexpectedly")
        }
        Ok(()) => anyhow::bail!("Event worker exited without a shutdown request"),
    }
}
