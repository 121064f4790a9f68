//! Session controller
//!
//! Drives one voice session at a time: wait for the wake phrase, capture
//! until the stop phrase or the deadline, transcribe, ask the agent, and
//! speak the reply.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::buffer::CaptureBuffer;
use super::signal::StopOutcome;
use super::state::{SessionEvent, SessionState, StateMachine, Transition};
use super::watcher::{StopWatcher, WatcherExit};
use crate::agent::Agent;
use crate::config::SessionConfig;
use crate::voice::{
    AudioSource, KeywordSpotter, ListenOutcome, ReadOutcome, Synthesizer, Transcriber, Transcript,
};
use crate::{Error, Result};

/// External services the controller drives
pub struct Collaborators {
    /// Listens for wake and stop phrases
    pub spotter: Arc<dyn KeywordSpotter>,
    /// Audio recorded during capture
    pub audio: Box<dyn AudioSource>,
    /// Speech-to-text
    pub transcriber: Arc<dyn Transcriber>,
    /// Produces the reply
    pub agent: Arc<dyn Agent>,
    /// Speaks the reply
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// Why a capture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The stop watcher heard a stop phrase
    StopPhrase,
    /// The capture deadline elapsed first
    DeadlineExceeded,
}

/// What happened during the capturing phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Why the capture ended
    pub reason: CaptureEnd,
    /// Number of audio segments recorded
    pub segments: usize,
    /// Total audio bytes recorded
    pub bytes: usize,
    /// Time spent capturing
    pub elapsed: Duration,
    /// The stop phrase heard, if any
    pub stop_phrase: Option<String>,
}

/// How a session cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No wake phrase within the armed wait
    NoWake,
    /// Nothing intelligible was captured
    NoSpeech,
    /// The reply was spoken
    Responded,
    /// The agent failed or timed out
    AgentFailed,
    /// A collaborator failed unrecoverably
    Fault(String),
}

/// Record of one session cycle
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Session identifier (also the `id` of its tracing span)
    pub id: Uuid,
    /// How the cycle ended
    pub outcome: SessionOutcome,
    /// State changes in order
    pub transitions: Vec<(SessionState, SessionState)>,
    /// Capture details, if capturing started and finished
    pub capture: Option<CaptureSummary>,
    /// Transcribed request
    pub transcript: Option<String>,
    /// Agent reply
    pub response: Option<String>,
}

impl SessionReport {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            outcome: SessionOutcome::NoWake,
            transitions: Vec::new(),
            capture: None,
            transcript: None,
            response: None,
        }
    }
}

/// Runs voice sessions over a set of collaborators
pub struct SessionController {
    config: SessionConfig,
    collaborators: Collaborators,
    machine: StateMachine,
}

impl SessionController {
    /// Create a controller in `Idle`
    #[must_use]
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            machine: StateMachine::new(),
        }
    }

    /// Current session state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run sessions until `shutdown` fires
    ///
    /// Faults end the current session only; the loop pauses for the fault
    /// backoff and re-arms. The machine is left in `Idle`.
    ///
    /// # Errors
    ///
    /// Returns error if the session configuration is invalid
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        self.config.validate()?;

        tracing::info!(
            wake = ?self.config.wake_phrases.phrases(),
            stop = ?self.config.stop_phrases.phrases(),
            "listening for wake phrase"
        );

        loop {
            let report = tokio::select! {
                () = shutdown.cancelled() => break,
                report = self.run_once() => report,
            };

            if let SessionOutcome::Fault(reason) = &report.outcome {
                tracing::warn!(%reason, backoff = ?self.config.fault_backoff, "re-arming after fault");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.config.fault_backoff) => {}
                }
            }
        }

        // Interrupted mid-session
        let _ = self.machine.apply(SessionEvent::Fault);
        tracing::info!("session engine stopped");
        Ok(())
    }

    /// Run exactly one session cycle, from `Idle` back to `Idle`
    ///
    /// Never fails: collaborator errors are folded into the report as a
    /// fault and the machine is reset.
    pub async fn run_once(&mut self) -> SessionReport {
        let id = Uuid::new_v4();
        let mut report = SessionReport::new(id);
        let span = tracing::info_span!("session", %id);

        async {
            let outcome = match self.drive(&mut report).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, state = %self.machine.state(), "session fault");
                    self.advance(SessionEvent::Fault, &mut report);
                    SessionOutcome::Fault(e.to_string())
                }
            };
            tracing::debug!(?outcome, "session finished");
            report.outcome = outcome;
        }
        .instrument(span)
        .await;

        report
    }

    async fn drive(&mut self, report: &mut SessionReport) -> Result<SessionOutcome> {
        // Idle: wait for the wake phrase
        let wake = self
            .collaborators
            .spotter
            .listen(&self.config.wake_phrases, self.config.timeouts.armed_wait)
            .await?;
        let ListenOutcome::Detected(detection) = wake else {
            tracing::debug!("no wake phrase");
            return Ok(SessionOutcome::NoWake);
        };
        tracing::info!(phrase = %detection.phrase, "wake phrase detected");
        self.advance(SessionEvent::WakePhraseDetected, report);

        // Armed: let the wake phrase finish before recording
        tokio::time::sleep(self.config.arming_delay).await;
        self.advance(SessionEvent::CaptureStarted, report);

        // Capturing
        let (audio, summary) = self.capture().await?;
        let event = match summary.reason {
            CaptureEnd::StopPhrase => SessionEvent::StopPhraseDetected,
            CaptureEnd::DeadlineExceeded => SessionEvent::DeadlineElapsed,
        };
        report.capture = Some(summary);
        self.advance(event, report);

        // Processing
        if audio.is_empty() {
            tracing::info!("nothing captured");
            self.advance(SessionEvent::TranscriptEmpty, report);
            return Ok(SessionOutcome::NoSpeech);
        }

        let Transcript::Text(text) = self.collaborators.transcriber.transcribe(&audio).await? else {
            tracing::info!("empty transcript");
            self.advance(SessionEvent::TranscriptEmpty, report);
            return Ok(SessionOutcome::NoSpeech);
        };
        tracing::info!(transcript = %text, "request transcribed");
        report.transcript = Some(text.clone());

        let reply = match self.ask_agent(&text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "agent failed");
                self.advance(SessionEvent::AgentFailed, report);
                return Ok(SessionOutcome::AgentFailed);
            }
        };
        report.response = Some(reply.clone());
        self.advance(SessionEvent::AgentResponded, report);

        // Responding
        if reply.trim().is_empty() {
            tracing::debug!("blank reply, nothing to speak");
        } else {
            let playback = self.collaborators.synthesizer.speak(&reply).await?;
            if let Err(e) = playback.await_completion().await {
                tracing::warn!(error = %e, "playback failed");
            }
        }
        self.advance(SessionEvent::PlaybackFinished, report);

        Ok(SessionOutcome::Responded)
    }

    /// Record until a stop phrase or the deadline
    ///
    /// The watcher is always shut down before this returns, on every path.
    async fn capture(&mut self) -> Result<(Vec<u8>, CaptureSummary)> {
        let deadline = self.config.timeouts.capture_deadline;
        let read_slice = self.config.read_slice;
        let audio = &mut self.collaborators.audio;

        audio.discard_pending();
        let (watcher, mut stop) = StopWatcher::spawn(
            Arc::clone(&self.collaborators.spotter),
            self.config.stop_phrases.clone(),
            self.config.watcher_slice,
        );

        let started = Instant::now();
        let mut buffer = CaptureBuffer::new();
        tracing::info!(?deadline, "capturing");

        let ended = loop {
            // Checked before the deadline so a stop phrase wins a tie
            if let Some(StopOutcome::Detected(detection)) = stop.try_take() {
                break Ok((CaptureEnd::StopPhrase, Some(detection.phrase)));
            }

            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break Ok((CaptureEnd::DeadlineExceeded, None));
            }

            // Guards against a hung source only; late reads must still land
            let slice = read_slice.min(remaining);
            match tokio::time::timeout(slice + read_slice, audio.read(slice)).await {
                Ok(Ok(ReadOutcome::Audio(bytes))) => {
                    let index = buffer.push(bytes);
                    tracing::trace!(index, "audio segment captured");
                }
                Ok(Ok(ReadOutcome::Timeout)) | Err(_) => {}
                Ok(Err(e)) => break Err(e),
            }
        };

        let elapsed = started.elapsed();

        if watcher.shutdown(self.config.watcher_grace).await == WatcherExit::Aborted {
            tracing::warn!("stop watcher had to be aborted");
        }

        let (mut reason, mut stop_phrase) = ended?;

        // A detection published in the same instant the deadline expired
        if reason == CaptureEnd::DeadlineExceeded
            && let Some(StopOutcome::Detected(detection)) = stop.try_take()
        {
            reason = CaptureEnd::StopPhrase;
            stop_phrase = Some(detection.phrase);
        }

        if reason == CaptureEnd::DeadlineExceeded {
            tracing::warn!(
                ?elapsed,
                segments = buffer.len(),
                "capture deadline exceeded without stop phrase"
            );
        } else {
            tracing::info!(?elapsed, segments = buffer.len(), "capture stopped by phrase");
        }

        let summary = CaptureSummary {
            reason,
            segments: buffer.len(),
            bytes: buffer.byte_len(),
            elapsed,
            stop_phrase,
        };
        Ok((buffer.flatten(), summary))
    }

    async fn ask_agent(&self, prompt: &str) -> Result<String> {
        let request = self.collaborators.agent.process(prompt);
        match self.config.agent_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| Error::Agent(format!("no reply within {limit:?}")))?,
            None => request.await,
        }
    }

    fn advance(&mut self, event: SessionEvent, report: &mut SessionReport) {
        record_transition(&mut self.machine, event, &mut report.transitions);
    }
}

/// Apply `event`, appending any state change to `transitions`
///
/// A rejected transition is a controller bug: it panics in debug builds and
/// is logged (state untouched) in release builds.
fn record_transition(
    machine: &mut StateMachine,
    event: SessionEvent,
    transitions: &mut Vec<(SessionState, SessionState)>,
) {
    match machine.apply(event) {
        Ok(Transition::Changed { from, to }) => {
            tracing::info!(%from, %to, "state transition");
            transitions.push((from, to));
        }
        Ok(Transition::Unchanged) => {}
        Err(e) => {
            tracing::error!(error = %e, "transition rejected");
            debug_assert!(false, "transition rejected: {e}");
        }
    }
}
