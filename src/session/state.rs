//! Session state machine
//!
//! Every session walks `Idle → Armed → Capturing → Processing → Responding → Idle`,
//! with early exits back to `Idle` from processing and a fault edge from anywhere.

use std::fmt;

use crate::{Error, Result};

/// Lifecycle state of a voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Waiting for the wake phrase
    #[default]
    Idle,
    /// Wake phrase heard, about to start capturing
    Armed,
    /// Recording the user's speech
    Capturing,
    /// Transcribing and asking the agent
    Processing,
    /// Speaking the agent's reply
    Responding,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Capturing => "capturing",
            Self::Processing => "processing",
            Self::Responding => "responding",
        };
        f.write_str(name)
    }
}

/// Event driving the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// The keyword spotter heard a wake phrase
    WakePhraseDetected,
    /// Capture is about to start
    CaptureStarted,
    /// The stop watcher heard a stop phrase
    StopPhraseDetected,
    /// The capture deadline elapsed
    DeadlineElapsed,
    /// Transcription produced no text
    TranscriptEmpty,
    /// The agent returned a reply
    AgentResponded,
    /// The agent failed or timed out
    AgentFailed,
    /// Reply playback finished (or was skipped)
    PlaybackFinished,
    /// Unrecoverable error in the current session
    Fault,
}

impl SessionEvent {
    /// The state this event leads to
    #[must_use]
    pub const fn target(self) -> SessionState {
        match self {
            Self::WakePhraseDetected => SessionState::Armed,
            Self::CaptureStarted => SessionState::Capturing,
            Self::StopPhraseDetected | Self::DeadlineElapsed => SessionState::Processing,
            Self::AgentResponded => SessionState::Responding,
            Self::TranscriptEmpty | Self::AgentFailed | Self::PlaybackFinished | Self::Fault => {
                SessionState::Idle
            }
        }
    }

    /// Whether the graph permits this event while in `from`
    #[must_use]
    pub const fn permitted_from(self, from: SessionState) -> bool {
        use SessionState as S;
        matches!(
            (self, from),
            (Self::WakePhraseDetected, S::Idle)
                | (Self::CaptureStarted, S::Armed)
                | (Self::StopPhraseDetected | Self::DeadlineElapsed, S::Capturing)
                | (
                    Self::TranscriptEmpty | Self::AgentResponded | Self::AgentFailed,
                    S::Processing
                )
                | (Self::PlaybackFinished, S::Responding)
                | (Self::Fault, _)
        )
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WakePhraseDetected => "wake_phrase_detected",
            Self::CaptureStarted => "capture_started",
            Self::StopPhraseDetected => "stop_phrase_detected",
            Self::DeadlineElapsed => "deadline_elapsed",
            Self::TranscriptEmpty => "transcript_empty",
            Self::AgentResponded => "agent_responded",
            Self::AgentFailed => "agent_failed",
            Self::PlaybackFinished => "playback_finished",
            Self::Fault => "fault",
        };
        f.write_str(name)
    }
}

/// Result of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The machine moved between two distinct states
    Changed {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },
    /// The machine was already in the event's target state
    Unchanged,
}

/// Tracks the current session state and enforces the transition graph
#[derive(Debug, Default)]
pub struct StateMachine {
    state: SessionState,
}

impl StateMachine {
    /// Create a machine in `Idle`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Apply an event
    ///
    /// Re-entering the current state is a no-op, so repeated notifications
    /// (for example a second fault) are harmless.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTransition` if the event is not permitted from
    /// the current state. The state is left untouched in that case.
    pub fn apply(&mut self, event: SessionEvent) -> Result<Transition> {
        let from = self.state;
        let to = event.target();

        if from == to {
            return Ok(Transition::Unchanged);
        }

        if !event.permitted_from(from) {
            return Err(Error::InvalidTransition { from, event });
        }

        self.state = to;
        tracing::debug!(%from, %to, %event, "session state changed");
        Ok(Transition::Changed { from, to })
    }
}
