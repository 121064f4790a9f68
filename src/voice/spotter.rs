//! Keyword spotting over the live microphone
//!
//! Uses a hybrid approach: local energy detection cuts utterances out of the
//! stream, then each utterance is transcribed and matched against the phrases.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::capture::{AudioFeed, samples_to_pcm};
use super::keyword::{Detection, KeywordSpotter, ListenOutcome, PhraseSet};
use super::{Transcriber, Transcript};
use crate::Result;

/// Speech energy threshold used until calibrated
pub const ENERGY_THRESHOLD: f32 = 0.03;

/// Calibrated thresholds sit this far above the ambient RMS
const AMBIENT_RATIO: f32 = 1.5;

/// Bounds for a calibrated threshold
const MIN_ENERGY_THRESHOLD: f32 = 0.01;
const MAX_ENERGY_THRESHOLD: f32 = 0.3;

/// Minimum duration of speech to trigger (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Longest utterance kept before it is cut (in samples)
const MAX_UTTERANCE_SAMPLES: usize = 160_000; // 10 seconds

/// Energy is measured over frames of this many samples
const FRAME_SAMPLES: usize = 480; // 30 ms

/// Upper bound on a single microphone poll
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Splits a sample stream into utterances using RMS energy
#[derive(Debug)]
pub struct SpeechSegmenter {
    threshold: f32,
    speaking: bool,
    buffer: Vec<f32>,
    silence_counter: usize,
}

impl SpeechSegmenter {
    /// Create an idle segmenter with the default threshold
    #[must_use]
    pub fn new() -> Self {
        Self::with_threshold(ENERGY_THRESHOLD)
    }

    /// Create an idle segmenter treating frames above `threshold` RMS as speech
    #[must_use]
    pub const fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            speaking: false,
            buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// RMS level above which a frame counts as speech
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed samples; returns a finished utterance if one closed
    ///
    /// Samples after the close are dropped; utterances are short and callers
    /// transcribe each one before feeding more.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        for frame in samples.chunks(FRAME_SAMPLES) {
            if let Some(utterance) = self.push_frame(frame) {
                return Some(utterance);
            }
        }
        None
    }

    fn push_frame(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        let energy = calculate_energy(frame);
        let is_speech = energy > self.threshold;

        if !self.speaking {
            if is_speech {
                self.speaking = true;
                self.buffer.clear();
                self.buffer.extend_from_slice(frame);
                self.silence_counter = 0;
                tracing::trace!(energy, "speech detected");
            }
            return None;
        }

        self.buffer.extend_from_slice(frame);
        if is_speech {
            self.silence_counter = 0;
        } else {
            self.silence_counter += frame.len();
        }

        if self.buffer.len() >= MAX_UTTERANCE_SAMPLES {
            tracing::debug!(samples = self.buffer.len(), "utterance cut at max length");
            return Some(self.take());
        }

        if self.silence_counter > SILENCE_SAMPLES {
            let voiced = self.buffer.len() - self.silence_counter;
            if voiced > MIN_SPEECH_SAMPLES {
                tracing::debug!(samples = self.buffer.len(), "speech segment complete");
                return Some(self.take());
            }
            // Blip too short to be speech
            self.reset();
        }

        None
    }

    /// Whether an utterance is in progress
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Drop any partial utterance
    pub fn reset(&mut self) {
        self.speaking = false;
        self.buffer.clear();
        self.silence_counter = 0;
    }

    fn take(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.buffer);
        self.reset();
        utterance
    }
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Speech threshold for a room whose background noise is `ambient`
#[must_use]
pub fn ambient_threshold(ambient: &[f32]) -> f32 {
    (calculate_energy(ambient) * AMBIENT_RATIO).clamp(MIN_ENERGY_THRESHOLD, MAX_ENERGY_THRESHOLD)
}

/// Sample `duration` of room noise from `feed` and derive a speech threshold
///
/// Falls back to the default threshold if no audio arrives.
///
/// # Errors
///
/// Returns `Error::DeviceUnavailable` if the microphone stops
pub async fn calibrate_ambient_noise(feed: &AudioFeed, duration: Duration) -> Result<f32> {
    let mut tap = feed.tap();
    let deadline = Instant::now() + duration;
    let mut ambient = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        if let Some(samples) = tap.read_samples(remaining.min(POLL_INTERVAL)).await? {
            ambient.extend_from_slice(&samples);
        }
    }

    if ambient.is_empty() {
        tracing::warn!(?duration, "no audio during calibration, keeping default threshold");
        return Ok(ENERGY_THRESHOLD);
    }

    let threshold = ambient_threshold(&ambient);
    tracing::info!(threshold, samples = ambient.len(), "ambient noise calibrated");
    Ok(threshold)
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Keyword spotter that transcribes each utterance heard on the microphone
pub struct TranscribingSpotter {
    feed: AudioFeed,
    transcriber: Arc<dyn Transcriber>,
    threshold: f32,
}

impl TranscribingSpotter {
    /// Create a spotter over a microphone feed
    #[must_use]
    pub fn new(feed: AudioFeed, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            feed,
            transcriber,
            threshold: ENERGY_THRESHOLD,
        }
    }

    /// Use a calibrated speech threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl KeywordSpotter for TranscribingSpotter {
    async fn listen(
        &self,
        phrases: &PhraseSet,
        deadline: Option<Duration>,
    ) -> Result<ListenOutcome> {
        let deadline = deadline.map(|d| Instant::now() + d);
        let mut tap = self.feed.tap();
        let mut segmenter = SpeechSegmenter::with_threshold(self.threshold);

        loop {
            let poll = match deadline {
                Some(end) => {
                    let remaining = end.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(ListenOutcome::Timeout);
                    }
                    remaining.min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            let Some(samples) = tap.read_samples(poll).await? else {
                continue;
            };
            let Some(utterance) = segmenter.push(&samples) else {
                continue;
            };

            match self.transcriber.transcribe(&samples_to_pcm(&utterance)).await {
                Ok(Transcript::Text(text)) => {
                    if let Some(phrase) = phrases.match_transcript(&text) {
                        tracing::info!(phrase, transcript = %text, "phrase detected");
                        return Ok(ListenOutcome::Detected(Detection {
                            phrase: phrase.to_string(),
                            confidence: None,
                        }));
                    }
                    tracing::debug!(transcript = %text, "no phrase in utterance");
                }
                Ok(Transcript::Empty) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "utterance transcription failed");
                }
            }
        }
    }
}
