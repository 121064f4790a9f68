//! Agent integration
//!
//! The session engine hands the transcript to an [`Agent`] and speaks whatever
//! comes back.

mod claude;

use async_trait::async_trait;

use crate::Result;

pub use claude::ClaudeAgent;

/// Turns a spoken request into a reply to speak back
#[async_trait]
pub trait Agent: Send + Sync {
    /// Process one request
    ///
    /// # Errors
    ///
    /// Returns error if the agent backend fails
    async fn process(&self, prompt: &str) -> Result<String>;
}

/// Shorten a reply so it is comfortable to listen to
///
/// Text within `max_chars` (counted in characters) is returned unchanged.
/// Longer text is cut at `max_chars`, pulled back to the last space when that
/// space falls in the final fifth of the window, and suffixed with `...`.
#[must_use]
pub fn spoken_summary(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(idx, _)| idx);
    let mut truncated = &text[..cut];

    if let Some(space) = truncated.rfind(' ') {
        let space_chars = truncated[..space].chars().count();
        // Only back off to a word boundary in the last 20% of the window
        if space_chars * 5 > max_chars * 4 {
            truncated = &truncated[..space];
        }
    }

    format!("{}...", truncated.trim_end())
}
