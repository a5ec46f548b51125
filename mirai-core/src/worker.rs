// ABOUTME: Event worker - runs Poller and Dispatcher on a dedicated thread with its own runtime.
// ABOUTME: Shutdown cancels a token and awaits the worker's completion signal before joining.

use crate::dispatcher::Dispatcher;
use crate::error::{Result, SessionError};
use crate::poller::Poller;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const THREAD_NAME: &str = "mirai-event-worker";

/// Handle to a running event worker.
///
/// Dropping the handle cancels the worker without waiting for it.
pub struct Worker {
    cancel: CancellationToken,
    finished: CancellationToken,
    done: oneshot::Receiver<Result<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the worker thread running `poller` and `dispatcher` over a shared queue
    pub fn spawn(poller: Poller, dispatcher: Dispatcher) -> Result<Self> {
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();
        let token = cancel.clone();
        let finished_signal = finished.clone();

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                // Fires on every exit path, panics included, after the outcome is sent
                let _finished = finished_signal.drop_guard();
                let outcome = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt.block_on(run_event_loops(poller, dispatcher, token)),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to create tokio runtime for event worker");
                        Err(SessionError::Worker(format!("runtime creation failed: {}", e)))
                    }
                };
                if done_tx.send(outcome).is_err() {
                    tracing::debug!("Worker handle dropped before completion was reported");
                }
            })
            .map_err(|e| SessionError::Worker(format!("thread spawn failed: {}", e)))?;

        tracing::info!("Event worker started");

        Ok(Self {
            cancel,
            finished,
            done: done_rx,
            thread: Some(thread),
        })
    }

    /// Whether the worker has already exited on its own
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Resolves once both loops have exited, whatever the reason.
    ///
    /// Does not consume the outcome; call `stop` afterwards to collect it.
    pub async fn finished(&self) {
        self.finished.cancelled().await;
    }

    /// Signal shutdown, wait for both loops to exit, then join the thread.
    ///
    /// Returns the failure that ended the worker, if any.
    pub async fn stop(mut self) -> Result<()> {
        self.cancel.cancel();

        let outcome = match (&mut self.done).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::Worker(
                "worker exited without reporting (panicked?)".to_string(),
            )),
        };

        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                tracing::error!("Event worker thread panicked");
                return Err(SessionError::Worker("worker thread panicked".to_string()));
            }
        }

        tracing::info!("Event worker stopped");
        outcome
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run both loops until each has exited; a failure in one cancels the other
async fn run_event_loops(
    poller: Poller,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();

    let poll_cancel = cancel.clone();
    let polling = async move {
        let result = poller.run(tx, poll_cancel.clone()).await;
        if result.is_err() {
            poll_cancel.cancel();
        }
        result
    };

    let dispatch_cancel = cancel.clone();
    let dispatching = async move {
        let result = dispatcher.run(rx, dispatch_cancel.clone()).await;
        if result.is_err() {
            dispatch_cancel.cancel();
        }
        result
    };

    let (polled, dispatched) = tokio::join!(polling, dispatching);
    if let Err(e) = &dispatched {
        tracing::error!(error = %e, "Dispatcher ended with an error");
    }
    dispatched.and(polled)
}
