//! Configuration management for Nero
//!
//! Values are resolved env > TOML file > default. The binary loads `.env`
//! into the process environment before calling [`Config::load`].

pub mod file;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::voice::{PhraseSet, SttProvider, TtsProvider};
use crate::{Error, Result};

use file::NeroConfigFile;

/// Default wake phrases
pub const DEFAULT_WAKE_PHRASES: [&str; 2] = ["nero ouvir", "nero"];

/// Default stop phrases
pub const DEFAULT_STOP_PHRASES: [&str; 3] = ["nero enviar", "enviar", "enviar nero"];

/// Ambient noise sampled before listening starts
pub const DEFAULT_CALIBRATION: Duration = Duration::from_secs(1);

/// Default agent model
pub const DEFAULT_AGENT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default system prompt for the voice agent
pub const DEFAULT_SYSTEM_PROMPT: &str = "Você é NERO, um assistente de voz inteligente em \
português brasileiro. Você é prestativo, conciso e responde sempre em português do Brasil. \
Quando executar tarefas, forneça respostas breves e claras, adequadas para serem lidas em voz alta.";

/// Nero configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Session engine configuration
    pub session: SessionConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Agent configuration
    pub agent: AgentConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Timeouts bounding one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// How long to wait for the wake phrase per cycle (`None` = forever)
    pub armed_wait: Option<Duration>,

    /// Hard ceiling on the capturing phase
    pub capture_deadline: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            armed_wait: None,
            capture_deadline: Duration::from_secs(600),
        }
    }
}

/// Session engine configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Phrases that arm the assistant
    pub wake_phrases: PhraseSet,

    /// Phrases that end a capture
    pub stop_phrases: PhraseSet,

    /// Wake wait and capture deadline
    pub timeouts: SessionTimeouts,

    /// Pause between arming and capturing, so the wake phrase is not recorded
    pub arming_delay: Duration,

    /// Per-read timeout of the capture loop
    pub read_slice: Duration,

    /// Per-listen timeout of the stop watcher
    pub watcher_slice: Duration,

    /// How long to wait for the stop watcher to exit before aborting it
    pub watcher_grace: Duration,

    /// Agent call timeout (`None` = unbounded)
    pub agent_timeout: Option<Duration>,

    /// Pause after a fault before re-arming
    pub fault_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wake_phrases: PhraseSet::new(DEFAULT_WAKE_PHRASES),
            stop_phrases: PhraseSet::new(DEFAULT_STOP_PHRASES),
            timeouts: SessionTimeouts::default(),
            arming_delay: Duration::from_millis(500),
            read_slice: Duration::from_secs(1),
            watcher_slice: Duration::from_secs(3),
            watcher_grace: Duration::from_secs(4),
            agent_timeout: Some(Duration::from_secs(60)),
            fault_backoff: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    /// Check the invariants the capture loop relies on
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first violated rule
    pub fn validate(&self) -> Result<()> {
        if self.wake_phrases.is_empty() {
            return Err(Error::Config("at least one wake phrase is required".to_string()));
        }
        if self.stop_phrases.is_empty() {
            return Err(Error::Config("at least one stop phrase is required".to_string()));
        }
        if self.timeouts.capture_deadline.is_zero() {
            return Err(Error::Config("capture deadline must be positive".to_string()));
        }
        if self.read_slice.is_zero() || self.watcher_slice.is_zero() {
            return Err(Error::Config("read and watcher slices must be positive".to_string()));
        }
        if self.read_slice > self.watcher_slice {
            return Err(Error::Config(format!(
                "read slice ({:?}) must not exceed watcher slice ({:?})",
                self.read_slice, self.watcher_slice
            )));
        }
        if self.watcher_grace < self.watcher_slice {
            return Err(Error::Config(format!(
                "watcher grace ({:?}) must cover one watcher slice ({:?})",
                self.watcher_grace, self.watcher_slice
            )));
        }
        Ok(())
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Speech-to-text backend
    pub stt_provider: SttProvider,

    /// STT model (e.g. "nova-2", "whisper-1")
    pub stt_model: String,

    /// Spoken language (BCP-47, e.g. "pt-BR")
    pub language: String,

    /// Text-to-speech backend
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "sonic-2", "tts-1")
    pub tts_model: String,

    /// TTS voice name or identifier
    pub tts_voice: String,

    /// TTS speed multiplier (`OpenAI` only)
    pub tts_speed: f32,

    /// Input device name or index; `None` opens the system default
    pub input_device: Option<String>,

    /// Ambient noise window for threshold calibration; `None` keeps the fixed threshold
    pub calibration: Option<Duration>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let stt_provider = SttProvider::default();
        let tts_provider = TtsProvider::default();
        Self {
            stt_provider,
            stt_model: stt_provider.default_model().to_string(),
            language: "pt-BR".to_string(),
            tts_provider,
            tts_model: tts_provider.default_model().to_string(),
            tts_voice: tts_provider.default_voice().to_string(),
            tts_speed: 1.0,
            input_device: None,
            calibration: Some(DEFAULT_CALIBRATION),
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier
    pub model: String,

    /// Response token limit
    pub max_tokens: u32,

    /// System prompt
    pub system_prompt: String,

    /// Longest reply spoken verbatim
    pub max_spoken_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_AGENT_MODEL.to_string(),
            max_tokens: 1024,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_spoken_chars: 200,
        }
    }
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// `Deepgram` API key (STT)
    pub deepgram: Option<String>,

    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<String>,

    /// `Cartesia` API key (TTS)
    pub cartesia: Option<String>,

    /// `ElevenLabs` API key (TTS)
    pub elevenlabs: Option<String>,

    /// `Anthropic` API key (agent)
    pub anthropic: Option<String>,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| if key.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("ApiKeys")
            .field("deepgram", &redact(&self.deepgram))
            .field("openai", &redact(&self.openai))
            .field("cartesia", &redact(&self.cartesia))
            .field("elevenlabs", &redact(&self.elevenlabs))
            .field("anthropic", &redact(&self.anthropic))
            .finish()
    }
}

/// Drop blank keys and template placeholders like `your_key_here`
fn real_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && !k.starts_with("your_"))
}

/// Parse a comma-separated env list
fn env_list(value: &str) -> Vec<String> {
    value.split(',').map(str::to_string).collect()
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// `path` overrides the config file location.
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is unknown or the result is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| file::config_file_path(env));
        let fc = path
            .map(|p| file::load_config_file(&p))
            .unwrap_or_default();

        let config = Self::from_sources(fc, env)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is unknown
    pub fn from_sources(fc: NeroConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = SessionConfig::default();
        let secs = |key: &str| env(key).and_then(|s| s.trim().parse::<u64>().ok());

        // Session config (env > toml > default)
        let wake_phrases = env("NERO_WAKE_PHRASES")
            .map(|s| env_list(&s))
            .or(fc.session.wake_phrases)
            .map_or(defaults.wake_phrases, PhraseSet::new);
        let stop_phrases = env("NERO_STOP_PHRASES")
            .map(|s| env_list(&s))
            .or(fc.session.stop_phrases)
            .map_or(defaults.stop_phrases, PhraseSet::new);

        let armed_wait = secs("NERO_ARMED_WAIT_SECS")
            .or(fc.session.armed_wait_secs)
            .filter(|&s| s > 0)
            .map(Duration::from_secs);
        let capture_deadline = secs("NERO_CAPTURE_DEADLINE_SECS")
            .or(fc.session.capture_deadline_secs)
            .map_or(defaults.timeouts.capture_deadline, Duration::from_secs);
        let agent_timeout = match fc.session.agent_timeout_secs {
            Some(0) => None,
            Some(s) => Some(Duration::from_secs(s)),
            None => defaults.agent_timeout,
        };

        let session = SessionConfig {
            wake_phrases,
            stop_phrases,
            timeouts: SessionTimeouts {
                armed_wait,
                capture_deadline,
            },
            arming_delay: fc
                .session
                .arming_delay_ms
                .map_or(defaults.arming_delay, Duration::from_millis),
            read_slice: fc
                .session
                .read_slice_ms
                .map_or(defaults.read_slice, Duration::from_millis),
            watcher_slice: fc
                .session
                .watcher_slice_ms
                .map_or(defaults.watcher_slice, Duration::from_millis),
            watcher_grace: fc
                .session
                .watcher_grace_ms
                .map_or(defaults.watcher_grace, Duration::from_millis),
            agent_timeout,
            fault_backoff: fc
                .session
                .fault_backoff_ms
                .map_or(defaults.fault_backoff, Duration::from_millis),
        };

        // Voice config (env > toml > provider default)
        let stt_provider: SttProvider = env("NERO_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();
        let tts_provider: TtsProvider = env("NERO_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();

        let voice = VoiceConfig {
            stt_provider,
            stt_model: env("NERO_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| stt_provider.default_model().to_string()),
            language: env("NERO_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or_else(|| "pt-BR".to_string()),
            tts_provider,
            tts_model: env("NERO_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| tts_provider.default_model().to_string()),
            tts_voice: env("NERO_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| tts_provider.default_voice().to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
            input_device: env("NERO_INPUT_DEVICE")
                .or(fc.voice.input_device)
                .filter(|d| !d.trim().is_empty()),
            calibration: match env("NERO_CALIBRATION_MS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .or(fc.voice.calibration_ms)
            {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => Some(DEFAULT_CALIBRATION),
            },
        };

        let agent_defaults = AgentConfig::default();
        let agent = AgentConfig {
            model: env("NERO_AGENT_MODEL")
                .or(fc.agent.model)
                .unwrap_or(agent_defaults.model),
            max_tokens: fc.agent.max_tokens.unwrap_or(agent_defaults.max_tokens),
            system_prompt: fc
                .agent
                .system_prompt
                .unwrap_or(agent_defaults.system_prompt),
            max_spoken_chars: fc
                .agent
                .max_spoken_chars
                .unwrap_or(agent_defaults.max_spoken_chars),
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            deepgram: real_key(env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram)),
            openai: real_key(env("OPENAI_API_KEY").or(fc.api_keys.openai)),
            cartesia: real_key(env("CARTESIA_API_KEY").or(fc.api_keys.cartesia)),
            elevenlabs: real_key(env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs)),
            anthropic: real_key(env("ANTHROPIC_API_KEY").or(fc.api_keys.anthropic)),
        };

        Ok(Self {
            session,
            voice,
            agent,
            api_keys,
        })
    }

    /// Validate the resolved configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the session settings are inconsistent
    pub fn validate(&self) -> Result<()> {
        self.session.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::file::{SessionFileConfig, VoiceFileConfig};

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(NeroConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.session.wake_phrases.phrases(), ["nero ouvir", "nero"]);
        assert_eq!(
            config.session.stop_phrases.phrases(),
            ["nero enviar", "enviar", "enviar nero"]
        );
        assert_eq!(config.session.timeouts.armed_wait, None);
        assert_eq!(
            config.session.timeouts.capture_deadline,
            Duration::from_secs(600)
        );
        assert_eq!(config.voice.stt_provider, SttProvider::Deepgram);
        assert_eq!(config.voice.stt_model, "nova-2");
        assert_eq!(config.voice.tts_provider, TtsProvider::Cartesia);
        assert_eq!(config.voice.tts_voice, "ana");
        assert_eq!(config.agent.max_spoken_chars, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_beats_file() {
        let fc = NeroConfigFile {
            session: SessionFileConfig {
                stop_phrases: Some(vec!["pronto".to_string()]),
                capture_deadline_secs: Some(120),
                ..SessionFileConfig::default()
            },
            voice: VoiceFileConfig {
                stt_provider: Some("whisper".to_string()),
                ..VoiceFileConfig::default()
            },
            ..NeroConfigFile::default()
        };
        let env = env_from(&[
            ("NERO_STOP_PHRASES", "Terminei, Acabou"),
            ("NERO_ARMED_WAIT_SECS", "15"),
        ]);

        let config = Config::from_sources(fc, env).unwrap();
        assert_eq!(config.session.stop_phrases.phrases(), ["terminei", "acabou"]);
        assert_eq!(
            config.session.timeouts.capture_deadline,
            Duration::from_secs(120)
        );
        assert_eq!(
            config.session.timeouts.armed_wait,
            Some(Duration::from_secs(15))
        );
        assert_eq!(config.voice.stt_provider, SttProvider::Whisper);
        assert_eq!(config.voice.stt_model, "whisper-1");
    }

    #[test]
    fn test_zero_armed_wait_means_forever() {
        let config =
            Config::from_sources(NeroConfigFile::default(), env_from(&[("NERO_ARMED_WAIT_SECS", "0")]))
                .unwrap();
        assert_eq!(config.session.timeouts.armed_wait, None);
    }

    #[test]
    fn test_input_device_and_calibration() {
        let fc = NeroConfigFile {
            voice: VoiceFileConfig {
                input_device: Some("USB Headset".to_string()),
                calibration_ms: Some(1500),
                ..VoiceFileConfig::default()
            },
            ..NeroConfigFile::default()
        };
        let config = Config::from_sources(fc, env_from(&[])).unwrap();
        assert_eq!(config.voice.input_device.as_deref(), Some("USB Headset"));
        assert_eq!(config.voice.calibration, Some(Duration::from_millis(1500)));

        let env = env_from(&[("NERO_INPUT_DEVICE", "2"), ("NERO_CALIBRATION_MS", "0")]);
        let config = Config::from_sources(NeroConfigFile::default(), env).unwrap();
        assert_eq!(config.voice.input_device.as_deref(), Some("2"));
        assert_eq!(config.voice.calibration, None);

        let config = Config::from_sources(NeroConfigFile::default(), env_from(&[])).unwrap();
        assert_eq!(config.voice.input_device, None);
        assert_eq!(config.voice.calibration, Some(DEFAULT_CALIBRATION));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = Config::from_sources(
            NeroConfigFile::default(),
            env_from(&[("NERO_TTS_PROVIDER", "espeak")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_placeholder_keys_are_missing() {
        let env = env_from(&[
            ("ANTHROPIC_API_KEY", "your_anthropic_key_here"),
            ("DEEPGRAM_API_KEY", "dg-123"),
            ("CARTESIA_API_KEY", "   "),
        ]);
        let config = Config::from_sources(NeroConfigFile::default(), env).unwrap();
        assert!(config.api_keys.anthropic.is_none());
        assert!(config.api_keys.cartesia.is_none());
        assert_eq!(config.api_keys.deepgram.as_deref(), Some("dg-123"));

        let debug = format!("{:?}", config.api_keys);
        assert!(!debug.contains("dg-123"));
    }

    #[test]
    fn test_validate_rules() {
        let mut session = SessionConfig {
            stop_phrases: PhraseSet::new(Vec::<String>::new()),
            ..SessionConfig::default()
        };
        assert!(session.validate().is_err());

        session = SessionConfig::default();
        session.timeouts.capture_deadline = Duration::ZERO;
        assert!(session.validate().is_err());

        session = SessionConfig::default();
        session.read_slice = Duration::from_secs(5);
        assert!(session.validate().is_err());

        session = SessionConfig::default();
        session.watcher_grace = Duration::from_secs(1);
        assert!(session.validate().is_err());
    }
}
