//! Background stop-phrase watcher
//!
//! Runs for exactly one capture. It listens in bounded slices so that
//! cancellation is noticed within one slice, and publishes at most one
//! outcome into its stop signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::signal::{StopOutcome, StopSignalReader, StopSignalWriter, stop_signal};
use crate::voice::{KeywordSpotter, ListenOutcome, PhraseSet};

/// How a watcher ended after shutdown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherExit {
    /// The task observed cancellation and returned
    Joined,
    /// The task did not return within the grace period and was aborted
    Aborted,
}

/// Handle to a running stop watcher
pub struct StopWatcher {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StopWatcher {
    /// Start watching for `phrases`
    ///
    /// Returns the handle and the read side of a fresh stop signal. Each
    /// capture gets its own signal, so a late detection can never reach a
    /// later session.
    #[must_use]
    pub fn spawn(
        spotter: Arc<dyn KeywordSpotter>,
        phrases: PhraseSet,
        slice: Duration,
    ) -> (Self, StopSignalReader) {
        let (writer, reader) = stop_signal();
        let token = CancellationToken::new();
        let task = tokio::spawn(watch(spotter, phrases, slice, token.clone(), writer));

        tracing::debug!(?slice, "stop watcher started");

        (
            Self {
                token,
                task: Some(task),
            },
            reader,
        )
    }

    /// Whether the watcher task has returned
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the watcher and wait up to `grace` for it to exit
    pub async fn shutdown(mut self, grace: Duration) -> WatcherExit {
        self.token.cancel();

        let Some(mut task) = self.task.take() else {
            return WatcherExit::Joined;
        };

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => {
                tracing::debug!("stop watcher joined");
                WatcherExit::Joined
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "stop watcher task failed");
                WatcherExit::Joined
            }
            Err(_) => {
                task.abort();
                tracing::warn!(?grace, "stop watcher ignored cancellation, aborted");
                WatcherExit::Aborted
            }
        }
    }
}

impl Drop for StopWatcher {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn watch(
    spotter: Arc<dyn KeywordSpotter>,
    phrases: PhraseSet,
    slice: Duration,
    token: CancellationToken,
    mut signal: StopSignalWriter,
) {
    loop {
        // A listen that is already complete wins over cancellation: its
        // detection belongs to this capture, whose signal is still open.
        let outcome = tokio::select! {
            biased;
            outcome = spotter.listen(&phrases, Some(slice)) => outcome,
            () = token.cancelled() => {
                signal.publish(StopOutcome::Cancelled);
                return;
            }
        };

        match outcome {
            Ok(ListenOutcome::Detected(detection)) => {
                tracing::info!(phrase = %detection.phrase, "stop phrase detected");
                signal.publish(StopOutcome::Detected(detection));
                return;
            }
            Ok(ListenOutcome::Timeout) if token.is_cancelled() => {
                signal.publish(StopOutcome::Cancelled);
                return;
            }
            Ok(ListenOutcome::Timeout) => {}
            Err(e) => {
                tracing::warn!(error = %e, "stop watcher listen failed");
                tokio::select! {
                    () = token.cancelled() => {
                        signal.publish(StopOutcome::Cancelled);
                        return;
                    }
                    () = tokio::time::sleep(slice) => {}
                }
            }
        }
    }
}
