//! Text-to-speech (TTS) processing

use std::fmt;
use std::str::FromStr;

use crate::config::{ApiKeys, VoiceConfig};
use crate::{Error, Result};

/// Cartesia API version header value
const CARTESIA_VERSION: &str = "2024-06-10";

/// Named Cartesia voices (Brazilian Portuguese)
const CARTESIA_VOICES: [(&str, &str); 2] = [
    ("ana", "79a125e8-cd45-4c13-8a67-a188a65c6d09"),
    ("lucas", "d6b6e68a-407c-45b0-9330-b96511922666"),
];

/// TTS provider backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TtsProvider {
    /// Cartesia Sonic
    #[default]
    Cartesia,
    /// `OpenAI` speech API
    OpenAI,
    /// `ElevenLabs`
    ElevenLabs,
}

impl TtsProvider {
    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Cartesia => "sonic-2",
            Self::OpenAI => "tts-1",
            Self::ElevenLabs => "eleven_multilingual_v2",
        }
    }

    /// Voice used when none is configured
    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::Cartesia => "ana",
            Self::OpenAI => "alloy",
            // "Rachel"
            Self::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
        }
    }
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cartesia" => Ok(Self::Cartesia),
            "openai" => Ok(Self::OpenAI),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

impl fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cartesia => "cartesia",
            Self::OpenAI => "openai",
            Self::ElevenLabs => "elevenlabs",
        })
    }
}

/// Resolve a Cartesia voice name to its id; unknown names are taken as ids
fn cartesia_voice_id(voice: &str) -> &str {
    CARTESIA_VOICES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(voice))
        .map_or(voice, |(_, id)| *id)
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    language: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS instance using Cartesia
    ///
    /// `voice` may be a named voice ("ana", "lucas") or a voice id.
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_cartesia(
        api_key: String,
        voice: &str,
        model: String,
        language: String,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Cartesia API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: cartesia_voice_id(voice).to_string(),
            speed: 1.0,
            model,
            language,
            provider: TtsProvider::Cartesia,
        })
    }

    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String, speed: f32, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            language: String::new(),
            provider: TtsProvider::OpenAI,
        })
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            speed: 1.0,
            model,
            language: String::new(),
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Create the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(voice: &VoiceConfig, keys: &ApiKeys) -> Result<Self> {
        let model = voice.tts_model.clone();
        match voice.tts_provider {
            TtsProvider::Cartesia => Self::new_cartesia(
                keys.cartesia.clone().unwrap_or_default(),
                &voice.tts_voice,
                model,
                voice.language.clone(),
            ),
            TtsProvider::OpenAI => Self::new_openai(
                keys.openai.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                voice.tts_speed,
                model,
            ),
            TtsProvider::ElevenLabs => Self::new_elevenlabs(
                keys.elevenlabs.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                model,
            ),
        }
    }

    /// Which backend this instance talks to
    #[must_use]
    pub const fn provider(&self) -> TtsProvider {
        self.provider
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(provider = %self.provider, chars = text.chars().count(), "synthesizing");
        match self.provider {
            TtsProvider::Cartesia => self.synthesize_cartesia(text).await,
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }

    /// Synthesize using Cartesia
    async fn synthesize_cartesia(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct CartesiaVoice<'a> {
            mode: &'a str,
            id: &'a str,
        }

        #[derive(serde::Serialize)]
        struct CartesiaFormat {
            container: &'static str,
            sample_rate: u32,
            bit_rate: u32,
        }

        #[derive(serde::Serialize)]
        struct CartesiaRequest<'a> {
            model_id: &'a str,
            transcript: &'a str,
            voice: CartesiaVoice<'a>,
            output_format: CartesiaFormat,
            language: &'a str,
        }

        // Cartesia takes the bare language code
        let language = self.language.split(['-', '_']).next().unwrap_or("pt");

        let request = CartesiaRequest {
            model_id: &self.model,
            transcript: text,
            voice: CartesiaVoice {
                mode: "id",
                id: &self.voice,
            },
            output_format: CartesiaFormat {
                container: "mp3",
                sample_rate: super::PLAYBACK_SAMPLE_RATE,
                bit_rate: 128_000,
            },
            language,
        };

        let response = self
            .client
            .post("https://api.cartesia.ai/tts/bytes")
            .header("X-API-Key", &self.api_key)
            .header("Cartesia-Version", CARTESIA_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Cartesia TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{}", self.voice);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
