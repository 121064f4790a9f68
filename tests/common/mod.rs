//! Shared test utilities
//!
//! Scripted collaborators driven by tokio's paused clock, so session timing
//! is deterministic without audio hardware or network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nero_voice::config::SessionConfig;
use nero_voice::{
    Agent, AudioSource, Collaborators, Detection, Error, KeywordSpotter, ListenOutcome, PhraseSet,
    PlaybackHandle, ReadOutcome, Result, Synthesizer, Transcriber, Transcript,
};
use tokio::time::Instant;

/// Bytes in each scripted audio chunk
pub const CHUNK_BYTES: usize = 4;

/// Session config with test-friendly timing
pub fn test_config(capture_deadline: Duration) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.timeouts.armed_wait = Some(Duration::from_secs(5));
    config.timeouts.capture_deadline = capture_deadline;
    config.arming_delay = Duration::ZERO;
    config.read_slice = Duration::from_millis(500);
    config.watcher_slice = Duration::from_secs(1);
    config.watcher_grace = Duration::from_secs(2);
    config.agent_timeout = Some(Duration::from_secs(5));
    config.fault_backoff = Duration::from_secs(1);
    config
}

/// Keyword spotter following a script
///
/// Wake listens pop queued outcomes (or time out when the queue is empty).
/// Stop listens detect the stop phrase `stop_after` the first stop listen.
pub struct ScriptedSpotter {
    stop_phrases: PhraseSet,
    wake: Mutex<VecDeque<Result<ListenOutcome>>>,
    stop_after: Option<Duration>,
    stop_origin: Mutex<Option<Instant>>,
    pub wake_listens: AtomicUsize,
    pub stop_listens: AtomicUsize,
}

impl ScriptedSpotter {
    pub fn new(config: &SessionConfig, stop_after: Option<Duration>) -> Self {
        Self {
            stop_phrases: config.stop_phrases.clone(),
            wake: Mutex::new(VecDeque::new()),
            stop_after,
            stop_origin: Mutex::new(None),
            wake_listens: AtomicUsize::new(0),
            stop_listens: AtomicUsize::new(0),
        }
    }

    /// Queue a wake-phrase detection
    pub fn wake_with(self, phrase: &str) -> Self {
        self.push_wake(Ok(ListenOutcome::Detected(Detection {
            phrase: phrase.to_string(),
            confidence: Some(0.95),
        })));
        self
    }

    /// Queue a failing wake listen
    pub fn wake_failing(self, error: Error) -> Self {
        self.push_wake(Err(error));
        self
    }

    fn push_wake(&self, outcome: Result<ListenOutcome>) {
        self.wake.lock().unwrap().push_back(outcome);
    }

    pub fn stop_listens(&self) -> usize {
        self.stop_listens.load(Ordering::SeqCst)
    }

    async fn listen_stop(&self, phrases: &PhraseSet, deadline: Option<Duration>) -> ListenOutcome {
        self.stop_listens.fetch_add(1, Ordering::SeqCst);
        let origin = *self
            .stop_origin
            .lock()
            .unwrap()
            .get_or_insert_with(Instant::now);
        let end = Instant::now() + deadline.unwrap_or(Duration::from_secs(3600));

        match self.stop_after.map(|after| origin + after) {
            Some(at) if at <= end => {
                tokio::time::sleep_until(at).await;
                ListenOutcome::Detected(Detection {
                    phrase: phrases.phrases()[0].clone(),
                    confidence: Some(0.9),
                })
            }
            _ => {
                tokio::time::sleep_until(end).await;
                ListenOutcome::Timeout
            }
        }
    }
}

#[async_trait]
impl KeywordSpotter for ScriptedSpotter {
    async fn listen(
        &self,
        phrases: &PhraseSet,
        deadline: Option<Duration>,
    ) -> Result<ListenOutcome> {
        if *phrases == self.stop_phrases {
            return Ok(self.listen_stop(phrases, deadline).await);
        }

        self.wake_listens.fetch_add(1, Ordering::SeqCst);
        let next = self.wake.lock().unwrap().pop_front();
        match next {
            Some(outcome) => outcome,
            None => match deadline {
                Some(wait) => {
                    tokio::time::sleep(wait).await;
                    Ok(ListenOutcome::Timeout)
                }
                None => std::future::pending().await,
            },
        }
    }
}

/// Audio source producing numbered chunks while the user "speaks"
///
/// Chunk `n` (1-based) is `CHUNK_BYTES` copies of `n`. After `speech_for`
/// every read waits out its slice and times out.
pub struct ScriptedAudio {
    speech_for: Duration,
    chunk_every: Duration,
    origin: Option<Instant>,
    sent: u8,
    pub discards: Arc<AtomicUsize>,
}

impl ScriptedAudio {
    pub fn speaking_for(speech_for: Duration) -> Self {
        Self {
            speech_for,
            chunk_every: Duration::from_millis(250),
            origin: None,
            sent: 0,
            discards: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn silent() -> Self {
        Self::speaking_for(Duration::ZERO)
    }
}

#[async_trait]
impl AudioSource for ScriptedAudio {
    async fn read(&mut self, slice: Duration) -> Result<ReadOutcome> {
        let origin = *self.origin.get_or_insert_with(Instant::now);
        if Instant::now() >= origin + self.speech_for {
            tokio::time::sleep(slice).await;
            return Ok(ReadOutcome::Timeout);
        }

        tokio::time::sleep(self.chunk_every.min(slice)).await;
        self.sent = self.sent.wrapping_add(1);
        Ok(ReadOutcome::Audio(vec![self.sent; CHUNK_BYTES]))
    }

    fn discard_pending(&mut self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }
}

/// Audio source whose device disappears after `fail_after`
pub struct FailingAudio {
    pub fail_after: Duration,
    origin: Option<Instant>,
}

impl FailingAudio {
    pub fn after(fail_after: Duration) -> Self {
        Self {
            fail_after,
            origin: None,
        }
    }
}

#[async_trait]
impl AudioSource for FailingAudio {
    async fn read(&mut self, slice: Duration) -> Result<ReadOutcome> {
        let origin = *self.origin.get_or_insert_with(Instant::now);
        if Instant::now() >= origin + self.fail_after {
            return Err(Error::DeviceUnavailable("microphone unplugged".to_string()));
        }
        tokio::time::sleep(slice).await;
        Ok(ReadOutcome::Timeout)
    }
}

/// Audio source that always answers a little after its slice
pub struct LateAudio {
    pub lateness: Duration,
    sent: u8,
}

impl LateAudio {
    pub fn by(lateness: Duration) -> Self {
        Self { lateness, sent: 0 }
    }
}

#[async_trait]
impl AudioSource for LateAudio {
    async fn read(&mut self, slice: Duration) -> Result<ReadOutcome> {
        tokio::time::sleep(slice + self.lateness).await;
        self.sent = self.sent.wrapping_add(1);
        Ok(ReadOutcome::Audio(vec![self.sent; CHUNK_BYTES]))
    }
}

/// Audio source whose reads never complete
pub struct StalledAudio;

#[async_trait]
impl AudioSource for StalledAudio {
    async fn read(&mut self, _slice: Duration) -> Result<ReadOutcome> {
        std::future::pending().await
    }
}

/// Transcriber returning a fixed transcript and recording its input
pub struct RecordingTranscriber {
    text: String,
    pub calls: AtomicUsize,
    pub received: Mutex<Vec<Vec<u8>>>,
}

impl RecordingTranscriber {
    pub fn returning(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_audio(&self) -> Vec<u8> {
        self.received.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Transcriber for RecordingTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(audio.to_vec());
        Ok(Transcript::from_raw(&self.text))
    }
}

/// How the mock agent answers
pub enum AgentBehavior {
    Reply(String),
    Fail,
    Hang,
}

/// Agent with scripted behavior
pub struct MockAgent {
    behavior: AgentBehavior,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl MockAgent {
    pub fn new(behavior: AgentBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(AgentBehavior::Reply(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn process(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.behavior {
            AgentBehavior::Reply(text) => Ok(text.clone()),
            AgentBehavior::Fail => Err(Error::Agent("model overloaded".to_string())),
            AgentBehavior::Hang => std::future::pending().await,
        }
    }
}

/// How the mock synthesizer behaves
#[derive(Clone, Copy)]
pub enum SpeakBehavior {
    Plays(Duration),
    SynthesisFails,
    PlaybackFails,
}

/// Synthesizer recording what it was asked to say
pub struct RecordingSynthesizer {
    behavior: SpeakBehavior,
    pub calls: AtomicUsize,
    pub spoken: Mutex<Vec<String>>,
}

impl RecordingSynthesizer {
    pub fn new(behavior: SpeakBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            spoken: Mutex::new(Vec::new()),
        }
    }

    pub fn playing() -> Self {
        Self::new(SpeakBehavior::Plays(Duration::from_secs(2)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn speak(&self, text: &str) -> Result<PlaybackHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.spoken.lock().unwrap().push(text.to_string());
        match self.behavior {
            SpeakBehavior::Plays(duration) => {
                let (done, handle) = PlaybackHandle::new();
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    let _ = done.send(Ok(()));
                });
                Ok(handle)
            }
            SpeakBehavior::SynthesisFails => Err(Error::Tts("quota exceeded".to_string())),
            SpeakBehavior::PlaybackFails => Ok(PlaybackHandle::finished(Err(Error::Playback(
                "speaker unplugged".to_string(),
            )))),
        }
    }
}

/// Shared handles to the mocks behind a set of collaborators
pub struct Mocks {
    pub spotter: Arc<ScriptedSpotter>,
    pub transcriber: Arc<RecordingTranscriber>,
    pub agent: Arc<MockAgent>,
    pub synthesizer: Arc<RecordingSynthesizer>,
}

impl Mocks {
    pub fn new(
        spotter: ScriptedSpotter,
        transcriber: RecordingTranscriber,
        agent: MockAgent,
        synthesizer: RecordingSynthesizer,
    ) -> Self {
        Self {
            spotter: Arc::new(spotter),
            transcriber: Arc::new(transcriber),
            agent: Arc::new(agent),
            synthesizer: Arc::new(synthesizer),
        }
    }

    pub fn collaborators(&self, audio: impl AudioSource + 'static) -> Collaborators {
        Collaborators {
            spotter: self.spotter.clone(),
            audio: Box::new(audio),
            transcriber: self.transcriber.clone(),
            agent: self.agent.clone(),
            synthesizer: self.synthesizer.clone(),
        }
    }
}
