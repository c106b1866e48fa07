//! Anthropic-backed Parser adapter
//!
//! Reference implementation of `ParserServicePort` (§4.9), reusing the same
//! Messages API shape as the LLM Summarizer's reference adapter.

use crate::domain::ParsedTranscript;
use crate::error::{CoordinatorError, Result};
use crate::ports::parser::ParserServicePort;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const SYSTEM_PROMPT: &str =
    "Normalize the given transcript fragment into clean prose, correcting obvious transcription \
artifacts but preserving meaning. Respond with the normalized text only.";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    system: String,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: String,
}

pub struct AnthropicParserService {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicParserService {
    pub fn new(api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("anthropic http client builds");
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ParserServicePort for AnthropicParserService {
    async fn parse(
        &self,
        text: &str,
        speakers: Option<&str>,
        timestamps: Option<&str>,
    ) -> Result<ParsedTranscript> {
        let request_body = MessagesRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: text.to_string(),
            }],
            max_tokens: 1024,
        };

        let response = self
            .client
            .post(format!("{ANTHROPIC_API_BASE}/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CoordinatorError::Parser(format!("messages request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::Parser(format!(
                "messages request failed: {error_text}"
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Parser(format!("failed to parse response: {e}")))?;

        let parsed_text = parsed
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text)
            .ok_or_else(|| CoordinatorError::Parser("no text content block returned".to_string()))?;

        Ok(ParsedTranscript {
            char_count: parsed_text.chars().count(),
            parsed_text,
            speakers: speakers.map(|s| s.to_string()),
            timestamps: timestamps.map(|s| s.to_string()),
            created_at: Utc::now().timestamp() as f64,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
