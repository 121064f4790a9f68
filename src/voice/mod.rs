//! Voice processing module
//!
//! Collaborator contracts used by the session engine, plus the concrete
//! microphone, keyword spotter, STT, TTS, and playback implementations.

mod capture;
mod keyword;
mod playback;
mod spotter;
mod stt;
mod tts;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{Error, Result};

pub use capture::{
    AudioFeed, Microphone, MicrophoneTap, SAMPLE_RATE, list_input_devices, pcm_to_samples,
    pcm_to_wav, samples_to_pcm, samples_to_wav, select_input_device,
};
pub use keyword::{Detection, KeywordSpotter, ListenOutcome, PhraseSet};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, SpeakerSynthesizer, decode_mp3};
pub use spotter::{
    ENERGY_THRESHOLD, SpeechSegmenter, TranscribingSpotter, ambient_threshold,
    calibrate_ambient_noise,
};
pub use stt::{SpeechToText, SttProvider};
pub use tts::{TextToSpeech, TtsProvider};

/// Result of one audio read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// PCM bytes (16-bit little-endian, mono, [`SAMPLE_RATE`])
    Audio(Vec<u8>),
    /// Nothing arrived within the slice
    Timeout,
}

/// Source of captured audio for the capture loop
#[async_trait]
pub trait AudioSource: Send {
    /// Read whatever audio arrives within `slice`
    ///
    /// Must return within roughly `slice`, with `ReadOutcome::Timeout` if no
    /// audio arrived.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if the input device is gone
    async fn read(&mut self, slice: Duration) -> Result<ReadOutcome>;

    /// Drop audio queued before this call
    fn discard_pending(&mut self) {}
}

/// Text produced by transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// Non-empty, trimmed text
    Text(String),
    /// Nothing intelligible was said
    Empty,
}

impl Transcript {
    /// Classify raw recognizer output, trimming whitespace
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Empty
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    /// The text, if any
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Empty => None,
        }
    }
}

/// Converts captured audio to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe PCM bytes (16-bit little-endian, mono, [`SAMPLE_RATE`])
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer fails
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript>;
}

/// Speaks text aloud
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start speaking `text`
    ///
    /// Returns once playback has started (or was skipped); completion is
    /// reported through the handle.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails before playback starts
    async fn speak(&self, text: &str) -> Result<PlaybackHandle>;
}

/// Completion handle for a started playback
#[derive(Debug)]
pub struct PlaybackHandle {
    done: oneshot::Receiver<Result<()>>,
}

impl PlaybackHandle {
    /// Create a handle and the sender that completes it
    #[must_use]
    pub fn new() -> (oneshot::Sender<Result<()>>, Self) {
        let (tx, done) = oneshot::channel();
        (tx, Self { done })
    }

    /// A handle that is already complete
    #[must_use]
    pub fn finished(result: Result<()>) -> Self {
        let (tx, handle) = Self::new();
        let _ = tx.send(result);
        handle
    }

    /// Wait until playback ends
    ///
    /// # Errors
    ///
    /// Returns the playback error, or `Error::Playback` if the player went
    /// away without reporting
    pub async fn await_completion(self) -> Result<()> {
        self.done
            .await
            .map_err(|_| Error::Playback("player dropped before finishing".to_string()))?
    }
}
