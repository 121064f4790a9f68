//! Nero - wake-phrase voice assistant engine
//!
//! This library provides the moving parts of a hands-free voice assistant:
//! - Session state machine (idle, armed, capturing, processing, responding)
//! - Capture loop racing a background stop-phrase watcher against a hard deadline
//! - Keyword spotting, microphone fan-out, STT, TTS, and playback collaborators
//! - Agent adapter for generating the spoken reply
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  SessionController                    │
//! │  Idle → Armed → Capturing → Processing → Responding   │
//! └───────┬──────────────┬──────────────┬────────────────┘
//!         │              │              │
//! ┌───────▼──────┐ ┌─────▼──────┐ ┌─────▼──────────────┐
//! │ KeywordSpotter│ │ StopWatcher│ │ Transcriber / Agent│
//! │ (wake phrase) │ │ (stop)     │ │ / Synthesizer      │
//! └───────┬──────┘ └─────┬──────┘ └────────────────────┘
//!         │              │
//! ┌───────▼──────────────▼───────┐
//! │   Microphone (broadcast feed) │
//! └──────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod session;
pub mod voice;

pub use agent::{Agent, ClaudeAgent, spoken_summary};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{
    CaptureEnd, CaptureSummary, Collaborators, SessionController, SessionEvent, SessionOutcome,
    SessionReport, SessionState,
};
pub use voice::{
    AudioSource, Detection, KeywordSpotter, ListenOutcome, PhraseSet, PlaybackHandle,
    ReadOutcome, Synthesizer, Transcriber, Transcript,
};
