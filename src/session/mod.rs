//! Voice session engine
//!
//! State machine, capture buffer, stop signal, stop watcher, and the
//! controller that ties them together.

mod buffer;
mod controller;
mod signal;
mod state;
mod watcher;

pub use buffer::{AudioSegment, CaptureBuffer};
pub use controller::{
    CaptureEnd, CaptureSummary, Collaborators, SessionController, SessionOutcome, SessionReport,
};
pub use signal::{StopOutcome, StopSignalReader, StopSignalWriter, stop_signal};
pub use state::{SessionEvent, SessionState, StateMachine, Transition};
pub use watcher::{StopWatcher, WatcherExit};
