//! Error types for the Nero voice engine

use thiserror::Error;

use crate::session::{SessionEvent, SessionState};

/// Result type alias for Nero operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice engine and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio processing error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone missing, denied, or its stream closed
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Agent error
    #[error("agent error: {0}")]
    Agent(String),

    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// The session state machine does not permit this event from this state
    #[error("invalid transition: {event} while {from}")]
    InvalidTransition {
        /// State the machine was in
        from: SessionState,
        /// Event that was rejected
        event: SessionEvent,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error means the audio hardware is gone
    ///
    /// Such errors end the current session immediately instead of being
    /// treated as an empty outcome.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }
}
