//! Keyword spotting contract and phrase matching

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// A phrase heard by a keyword spotter
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// The configured phrase that matched (normalized)
    pub phrase: String,
    /// Recognizer confidence, if the backend reports one
    pub confidence: Option<f32>,
}

/// Result of one `listen` call
#[derive(Debug, Clone, PartialEq)]
pub enum ListenOutcome {
    /// One of the phrases was heard
    Detected(Detection),
    /// The deadline passed without a match
    Timeout,
}

/// Listens for any of a set of phrases
///
/// Implementations must return within roughly `deadline` when one is given,
/// since the stop watcher relies on that to notice cancellation.
#[async_trait]
pub trait KeywordSpotter: Send + Sync {
    /// Wait until one of `phrases` is heard or `deadline` passes
    ///
    /// `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns error if the audio input fails
    async fn listen(&self, phrases: &PhraseSet, deadline: Option<Duration>)
    -> Result<ListenOutcome>;
}

/// Normalized set of trigger phrases
///
/// Matching is case-insensitive, ignores punctuation, and only matches whole
/// words, so "enviar" matches "Nero, enviar." but not "reenviar".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseSet {
    phrases: Vec<String>,
}

impl PhraseSet {
    /// Build a phrase set, dropping blanks and duplicates
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for phrase in phrases {
            let phrase = normalize(phrase.as_ref());
            if !phrase.is_empty() && !normalized.contains(&phrase) {
                normalized.push(phrase);
            }
        }

        Self { phrases: normalized }
    }

    /// The normalized phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Whether the set has no phrases
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Find the phrase contained in `transcript`
    ///
    /// When several match, the longest wins, so "nero enviar" beats "enviar".
    #[must_use]
    pub fn match_transcript(&self, transcript: &str) -> Option<&str> {
        let padded = format!(" {} ", normalize(transcript));

        self.phrases
            .iter()
            .filter(|phrase| padded.contains(&format!(" {phrase} ")))
            .max_by_key(|phrase| phrase.len())
            .map(String::as_str)
    }
}

/// Lowercase, strip punctuation, and collapse whitespace
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
