/// LLM service port
///
/// Defines the interface for the structured-inference call the Summarizer
/// drives. Implementations: OpenAI, Anthropic, etc.
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured response from a summarization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSummaryResponse {
    pub summary: String,
    pub key_points: Vec<String>,
}

#[async_trait]
pub trait LlmServicePort: Send + Sync {
    /// Produces a structured summary of `transcript`.
    async fn summarize(&self, transcript: &str) -> Result<LlmSummaryResponse>;

    /// The model id this client is configured with.
    fn model_id(&self) -> &str;

    fn is_configured(&self) -> bool;
}
