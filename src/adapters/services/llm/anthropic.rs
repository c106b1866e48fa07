//! Anthropic LLM service adapter
//!
//! Reference implementation of `LlmServicePort` against Anthropic's Messages
//! API. The transcript is summarized via a structured-JSON system prompt;
//! a prose fallback is only used if the model's response isn't valid JSON.

use crate::error::{CoordinatorError, Result};
use crate::ports::llm::{LlmServicePort, LlmSummaryResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const SYSTEM_PROMPT: &str = "You summarize a running meeting transcript. Respond with JSON only, \
shaped as {\"summary\": string, \"key_points\": string[]}.";

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

/// Reference `LlmServicePort` adapter for Anthropic's API (§2 Ambient Stack).
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicService {
    pub fn new(api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("anthropic http client builds");
        Self {
            client,
            api_key,
            model,
        }
    }

    async fn call_messages_api(&self, transcript: &str) -> Result<String> {
        let request_body = MessagesRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: transcript.to_string(),
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
            .map_err(|e| CoordinatorError::Llm(format!("messages request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::Llm(format!(
                "messages request failed: {error_text}"
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Llm(format!("failed to parse response: {e}")))?;

        parsed
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text)
            .ok_or_else(|| CoordinatorError::Llm("no text content block returned".to_string()))
    }
}

#[async_trait]
impl LlmServicePort for AnthropicService {
    async fn summarize(&self, transcript: &str) -> Result<LlmSummaryResponse> {
        let text = self.call_messages_api(transcript).await?;
        match serde_json::from_str::<LlmSummaryResponse>(&text) {
            Ok(parsed) => Ok(parsed),
            Err(_) => Ok(LlmSummaryResponse {
                summary: text,
                key_points: Vec::new(),
            }),
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_unconfigured_with_empty_api_key() {
        let service = AnthropicService::new(String::new(), "claude-3-5-sonnet".to_string());
        assert!(!service.is_configured());
    }

    #[test]
    fn reports_configured_with_api_key_present() {
        let service = AnthropicService::new("sk-test".to_string(), "claude-3-5-sonnet".to_string());
        assert!(service.is_configured());
        assert_eq!(service.model_id(), "claude-3-5-sonnet");
    }
}
