//! Claude agent over the Anthropic Messages API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Agent, spoken_summary};
use crate::config::AgentConfig;
use crate::{Error, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Agent backed by a single Claude completion per request
pub struct ClaudeAgent {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    max_spoken_chars: usize,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Anthropic message response
#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

impl ClaudeAgent {
    /// Create a new Claude agent
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, config: &AgentConfig) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Anthropic API key required for the agent".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
            max_spoken_chars: config.max_spoken_chars,
        })
    }

    /// Model this agent queries
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Join the text blocks of a reply
fn reply_text(response: MessageResponse) -> String {
    response
        .content
        .into_iter()
        .filter_map(|c| c.text)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Agent for ClaudeAgent {
    async fn process(&self, prompt: &str) -> Result<String> {
        tracing::debug!(model = %self.model, chars = prompt.chars().count(), "querying agent");

        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &self.system_prompt,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!("API error {status}: {body}")));
        }

        let result: MessageResponse = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("parse error: {e}")))?;

        let reply = reply_text(result);
        tracing::debug!(reply = %reply, "agent replied");

        Ok(spoken_summary(&reply, self.max_spoken_chars))
    }
}
