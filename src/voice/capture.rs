//! Audio capture from microphone
//!
//! The cpal input stream lives on its own OS thread (`cpal::Stream` is not
//! `Send`) and publishes sample chunks into a broadcast channel. Any number
//! of readers subscribe independently, so the capture loop and the stop
//! watcher can listen to the same microphone at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig, SupportedStreamConfigRange};
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::{AudioSource, ReadOutcome};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Chunks buffered per subscriber before it starts lagging (~10 s of cpal callbacks)
const FEED_CAPACITY: usize = 1024;

/// How often the input thread checks for shutdown
const THREAD_POLL: Duration = Duration::from_millis(50);

type Chunk = Arc<[f32]>;

/// Owns the microphone input thread
///
/// Dropping the microphone stops the stream; open subscriptions then read
/// `Error::DeviceUnavailable`.
pub struct Microphone {
    feed: AudioFeed,
    device: String,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Microphone {
    /// Open an input device and start streaming
    ///
    /// `device` is a name (exact, or a case-insensitive fragment) or an index
    /// from [`list_input_devices`]; `None` opens the system default.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if there is no usable input device
    pub fn open(device: Option<&str>) -> Result<Self> {
        let wanted = device.map(str::to_string);
        let (tx, template) = broadcast::channel::<Chunk>(FEED_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let flag = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("nero-mic".to_string())
            .spawn(move || run_input_stream(wanted.as_deref(), &tx, &flag, &ready_tx))?;

        let device = match ready_rx.recv() {
            Ok(Ok(device)) => device,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::DeviceUnavailable(
                    "input thread exited during startup".to_string(),
                ));
            }
        };

        tracing::info!(device, sample_rate = SAMPLE_RATE, "microphone opened");

        Ok(Self {
            feed: AudioFeed { template },
            device,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Handle for creating subscriptions
    #[must_use]
    pub fn feed(&self) -> AudioFeed {
        self.feed.clone()
    }

    /// Name of the input device
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        tracing::debug!("microphone closed");
    }
}

/// Body of the input thread
fn run_input_stream(
    wanted: Option<&str>,
    tx: &broadcast::Sender<Chunk>,
    shutdown: &Arc<AtomicBool>,
    ready: &mpsc::Sender<Result<String>>,
) {
    let lost = Arc::new(AtomicBool::new(false));

    let stream = match build_input_stream(wanted, tx.clone(), Arc::clone(&lost)) {
        Ok((stream, device)) => {
            let _ = ready.send(Ok(device));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while !shutdown.load(Ordering::Relaxed) && !lost.load(Ordering::Relaxed) {
        std::thread::sleep(THREAD_POLL);
    }

    if lost.load(Ordering::Relaxed) {
        tracing::error!("input device lost");
    }
    drop(stream);
}

/// Names of the available input devices, in index order
///
/// # Errors
///
/// Returns `Error::DeviceUnavailable` if the audio host cannot enumerate devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let devices = cpal::default_host()
        .input_devices()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
    Ok(devices.map(|d| d.name().unwrap_or_default()).collect())
}

/// Resolve a device setting against the available names
///
/// An in-range index wins, then an exact name, then the first name containing
/// `wanted` (case-insensitive).
#[must_use]
pub fn select_input_device(names: &[String], wanted: &str) -> Option<usize> {
    let wanted = wanted.trim();
    if let Ok(index) = wanted.parse::<usize>() {
        return (index < names.len()).then_some(index);
    }

    let lowered = wanted.to_lowercase();
    names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(wanted))
        .or_else(|| {
            names
                .iter()
                .position(|name| name.to_lowercase().contains(&lowered))
        })
}

fn open_input_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device> {
    let Some(wanted) = wanted else {
        return host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()));
    };

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .collect();
    let names: Vec<String> = devices
        .iter()
        .map(|d| d.name().unwrap_or_default())
        .collect();

    select_input_device(&names, wanted)
        .and_then(|index| devices.into_iter().nth(index))
        .ok_or_else(|| Error::DeviceUnavailable(format!("input device not found: {wanted}")))
}

fn build_input_stream(
    wanted: Option<&str>,
    tx: broadcast::Sender<Chunk>,
    lost: Arc<AtomicBool>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();

    let device = open_input_device(&host, wanted)?;
    let name = device.name().unwrap_or_default();

    let supports_rate = |c: &SupportedStreamConfigRange| {
        c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
            && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
    };

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .find(|c| c.channels() == 1 && supports_rate(c))
        .or_else(|| {
            // Fallback: any channel count, downmixed in the callback
            device
                .supported_input_configs()
                .ok()?
                .find(|c| supports_rate(c))
        })
        .ok_or_else(|| Error::DeviceUnavailable("no suitable audio config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();
    let channels = usize::from(config.channels.max(1));

    tracing::debug!(
        device = name,
        sample_rate = SAMPLE_RATE,
        channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let chunk: Chunk = if channels == 1 {
                    Arc::from(data)
                } else {
                    downmix(data, channels).into()
                };
                // No receivers only happens during shutdown
                let _ = tx.send(chunk);
            },
            move |err| {
                tracing::error!(error = %err, "audio capture error");
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    lost.store(true, Ordering::Relaxed);
                }
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    Ok((stream, name))
}

/// Average interleaved frames down to mono
#[allow(clippy::cast_precision_loss)]
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Cloneable handle to the microphone broadcast
///
/// The feed holds no sender, so once the input thread stops every
/// subscription observes the channel as closed.
pub struct AudioFeed {
    template: broadcast::Receiver<Chunk>,
}

impl Clone for AudioFeed {
    fn clone(&self) -> Self {
        Self {
            template: self.template.resubscribe(),
        }
    }
}

impl AudioFeed {
    /// Subscribe from now on
    #[must_use]
    pub fn tap(&self) -> MicrophoneTap {
        MicrophoneTap {
            rx: self.template.resubscribe(),
        }
    }

    /// Build a feed from an existing broadcast sender
    ///
    /// Useful for driving the engine from something other than cpal, such
    /// as a file or a test signal.
    #[must_use]
    pub fn from_sender(tx: &broadcast::Sender<Arc<[f32]>>) -> Self {
        Self {
            template: tx.subscribe(),
        }
    }
}

/// One independent subscription to the microphone
pub struct MicrophoneTap {
    rx: broadcast::Receiver<Chunk>,
}

impl MicrophoneTap {
    /// Gather all samples arriving within `slice`
    ///
    /// Returns `None` if nothing arrived.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if the microphone has stopped
    pub async fn read_samples(&mut self, slice: Duration) -> Result<Option<Vec<f32>>> {
        let deadline = Instant::now() + slice;
        let mut samples = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => break,
                Ok(Ok(chunk)) => samples.extend_from_slice(&chunk),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "audio reader lagging, dropped chunks");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    if samples.is_empty() {
                        return Err(Error::DeviceUnavailable(
                            "microphone stream closed".to_string(),
                        ));
                    }
                    break;
                }
            }
        }

        Ok((!samples.is_empty()).then_some(samples))
    }
}

#[async_trait]
impl AudioSource for MicrophoneTap {
    async fn read(&mut self, slice: Duration) -> Result<ReadOutcome> {
        Ok(match self.read_samples(slice).await? {
            Some(samples) => ReadOutcome::Audio(samples_to_pcm(&samples)),
            None => ReadOutcome::Timeout,
        })
    }

    fn discard_pending(&mut self) {
        self.rx = self.rx.resubscribe();
    }
}

/// Convert f32 samples to 16-bit little-endian PCM
#[must_use]
pub fn samples_to_pcm(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| to_i16(sample).to_le_bytes())
        .collect()
}

/// Convert 16-bit little-endian PCM to f32 samples
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn pcm_to_samples(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}

/// Wrap 16-bit little-endian PCM in a mono WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    write_wav(
        pcm.chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        sample_rate,
    )
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    write_wav(samples.iter().map(|&s| to_i16(s)), sample_rate)
}

fn write_wav(samples: impl Iterator<Item = i16>, sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Convert f32 [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
