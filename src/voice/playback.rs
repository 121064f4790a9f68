//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig, SupportedStreamConfigRange};

use super::tts::TextToSpeech;
use super::{PlaybackHandle, Synthesizer};
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Extra time allowed past the nominal clip length
const DRAIN_MARGIN: Duration = Duration::from_millis(500);

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let supports_rate = |c: &SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|c| c.channels() == 1 && supports_rate(c))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| c.channels() == 2 && supports_rate(c))
            })
            .ok_or_else(|| Error::Playback("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Play MP3 bytes, blocking until done
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let samples = decode_mp3(mp3_data)?;
        self.play(samples)
    }

    /// Play mono samples at [`PLAYBACK_SAMPLE_RATE`], blocking until done
    ///
    /// # Errors
    ///
    /// Returns error if the output stream fails
    pub fn play(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels.max(1));
        let sample_count = samples.len();

        let finished = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let finished_cb = Arc::clone(&finished);
        let failed_cb = Arc::clone(&failed);

        let mut position = 0usize;
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(position).copied().unwrap_or_else(|| {
                            finished_cb.store(true, Ordering::Relaxed);
                            0.0
                        });
                        frame.fill(sample);
                        position = (position + 1).min(samples.len());
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio playback error");
                    failed_cb.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?;

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        // Poll for completion with timeout
        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let timeout = Duration::from_millis(duration_ms) + DRAIN_MARGIN;
        let start = std::time::Instant::now();

        while !finished.load(Ordering::Relaxed) {
            if failed.load(Ordering::Relaxed) {
                return Err(Error::Playback("output stream failed".to_string()));
            }
            if start.elapsed() > timeout {
                tracing::warn!(samples = sample_count, "playback did not drain in time");
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Small delay to ensure audio finishes
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

/// Speaks text through a TTS provider and the default speakers
pub struct SpeakerSynthesizer {
    tts: Arc<TextToSpeech>,
}

impl SpeakerSynthesizer {
    /// Create a synthesizer over a TTS provider
    #[must_use]
    pub const fn new(tts: Arc<TextToSpeech>) -> Self {
        Self { tts }
    }
}

#[async_trait]
impl Synthesizer for SpeakerSynthesizer {
    async fn speak(&self, text: &str) -> Result<PlaybackHandle> {
        if text.trim().is_empty() {
            return Ok(PlaybackHandle::finished(Ok(())));
        }

        let audio = self.tts.synthesize(text).await?;
        tracing::debug!(bytes = audio.len(), "speech synthesized");

        let (done, handle) = PlaybackHandle::new();
        tokio::task::spawn_blocking(move || {
            let result = AudioPlayback::new().and_then(|playback| playback.play_mp3(&audio));
            let _ = done.send(result);
        });

        Ok(handle)
    }
}
