//! Single-slot stop signal between the stop watcher and the capture loop

use tokio::sync::oneshot;

use crate::voice::Detection;

/// What the stop watcher concluded
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// A stop phrase was heard
    Detected(Detection),
    /// The watcher was cancelled before hearing anything
    Cancelled,
}

/// Create a connected writer/reader pair
#[must_use]
pub fn stop_signal() -> (StopSignalWriter, StopSignalReader) {
    let (tx, rx) = oneshot::channel();
    (
        StopSignalWriter { tx: Some(tx) },
        StopSignalReader { rx: Some(rx) },
    )
}

/// Write side, owned by the stop watcher
#[derive(Debug)]
pub struct StopSignalWriter {
    tx: Option<oneshot::Sender<StopOutcome>>,
}

impl StopSignalWriter {
    /// Publish an outcome
    ///
    /// Only the first publish counts; later calls return `false` and change
    /// nothing.
    pub fn publish(&mut self, outcome: StopOutcome) -> bool {
        let Some(tx) = self.tx.take() else {
            return false;
        };
        // Reader gone means the capture already ended; the value is moot.
        let _ = tx.send(outcome);
        true
    }

    /// Whether an outcome has already been published
    #[must_use]
    pub const fn is_published(&self) -> bool {
        self.tx.is_none()
    }
}

/// Read side, owned by the capture loop
#[derive(Debug)]
pub struct StopSignalReader {
    rx: Option<oneshot::Receiver<StopOutcome>>,
}

impl StopSignalReader {
    /// Take the published outcome without waiting
    ///
    /// Yields a value at most once. A writer dropped without publishing reads
    /// as nothing.
    pub fn try_take(&mut self) -> Option<StopOutcome> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                Some(outcome)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                None
            }
        }
    }
}
