//! TOML configuration file loading
//!
//! Supports `~/.config/nero/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NeroConfigFile {
    /// Session timing and phrases
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Agent configuration
    #[serde(default)]
    pub agent: AgentFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Phrases that arm the assistant (e.g. `["nero"]`)
    pub wake_phrases: Option<Vec<String>>,

    /// Phrases that end a capture (e.g. `["enviar"]`)
    pub stop_phrases: Option<Vec<String>>,

    /// Seconds to wait for the wake phrase per cycle (0 = forever)
    pub armed_wait_secs: Option<u64>,

    /// Hard ceiling on a capture, in seconds
    pub capture_deadline_secs: Option<u64>,

    /// Pause between arming and capturing, in milliseconds
    pub arming_delay_ms: Option<u64>,

    /// Per-read timeout of the capture loop, in milliseconds
    pub read_slice_ms: Option<u64>,

    /// Per-listen timeout of the stop watcher, in milliseconds
    pub watcher_slice_ms: Option<u64>,

    /// How long to wait for the stop watcher to exit, in milliseconds
    pub watcher_grace_ms: Option<u64>,

    /// Agent call timeout in seconds (0 = none)
    pub agent_timeout_secs: Option<u64>,

    /// Pause after a fault before re-arming, in milliseconds
    pub fault_backoff_ms: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT provider ("deepgram" or "whisper")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "nova-2")
    pub stt_model: Option<String>,

    /// Spoken language (e.g. "pt-BR")
    pub language: Option<String>,

    /// TTS provider ("cartesia", "openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "sonic-2")
    pub tts_model: Option<String>,

    /// TTS voice name or identifier (e.g. "ana")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Input device name or index, as shown by `nero list-mics`
    pub input_device: Option<String>,

    /// Ambient noise sampled at startup to set the speech threshold (0 = off)
    pub calibration_ms: Option<u64>,
}

/// Agent configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// Model identifier (e.g. "claude-sonnet-4-20250514")
    pub model: Option<String>,

    /// Response token limit
    pub max_tokens: Option<u32>,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// Longest reply spoken before it is summarized
    pub max_spoken_chars: Option<usize>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub deepgram: Option<String>,
    pub openai: Option<String>,
    pub cartesia: Option<String>,
    pub elevenlabs: Option<String>,
    pub anthropic: Option<String>,
}

/// Load the TOML config file at `path`
///
/// Returns `NeroConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: &Path) -> NeroConfigFile {
    if !path.exists() {
        return NeroConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                NeroConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            NeroConfigFile::default()
        }
    }
}

/// Return the config file path
///
/// `NERO_CONFIG` wins over the standard `~/.config/nero/config.toml`.
pub fn config_file_path(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    env("NERO_CONFIG").map(PathBuf::from).or_else(|| {
        directories::BaseDirs::new().map(|d| d.config_dir().join("nero").join("config.toml"))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file(&dir.path().join("absent.toml"));
        assert!(fc.session.wake_phrases.is_none());
        assert!(fc.api_keys.anthropic.is_none());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[session]
stop_phrases = ["pronto"]
capture_deadline_secs = 30

[voice]
tts_voice = "lucas"
"#
        )
        .unwrap();

        let fc = load_config_file(file.path());
        assert_eq!(fc.session.stop_phrases, Some(vec!["pronto".to_string()]));
        assert_eq!(fc.session.capture_deadline_secs, Some(30));
        assert_eq!(fc.voice.tts_voice.as_deref(), Some("lucas"));
        assert!(fc.agent.model.is_none());
    }

    #[test]
    fn test_invalid_file_is_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "session = \"not a table\"").unwrap();

        let fc = load_config_file(file.path());
        assert!(fc.session.stop_phrases.is_none());
    }

    #[test]
    fn test_env_overrides_path() {
        let path = config_file_path(|key| {
            (key == "NERO_CONFIG").then(|| "/tmp/nero-test.toml".to_string())
        });
        assert_eq!(path, Some(PathBuf::from("/tmp/nero-test.toml")));
    }
}
