/// Parser invocation wrapper
///
/// Truncates accumulated text to the configured output budget and calls the
/// parser port (§4.9). Bookkeeping (the bounded history ring, `last_parsed`)
/// lives on `Coordinator`; this type only owns the external call and its
/// truncation policy.
use crate::domain::ParsedTranscript;
use crate::error::Result;
use crate::ports::parser::ParserServicePort;
use std::sync::Arc;

/// Rough chars-per-token ratio used to approximate a token budget without
/// pulling in a tokenizer dependency the corpus doesn't otherwise need.
const CHARS_PER_TOKEN_ESTIMATE: usize = 4;

pub struct ParserInvoker {
    parser: Arc<dyn ParserServicePort>,
    max_output_tokens: u32,
}

impl ParserInvoker {
    pub fn new(parser: Arc<dyn ParserServicePort>, max_output_tokens: u32) -> Self {
        Self {
            parser,
            max_output_tokens,
        }
    }

    pub async fn invoke(
        &self,
        text: &str,
        speakers: Option<&str>,
        timestamps: Option<&str>,
    ) -> Result<ParsedTranscript> {
        let truncated = self.truncate(text);
        self.parser.parse(&truncated, speakers, timestamps).await
    }

    fn truncate(&self, text: &str) -> String {
        let max_chars = self.max_output_tokens as usize * CHARS_PER_TOKEN_ESTIMATE;
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        text.chars().take(max_chars).collect()
    }

    pub fn model_id(&self) -> &str {
        self.parser.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::FakeParserService;

    #[tokio::test]
    async fn invokes_parser_with_untouched_short_text() {
        let invoker = ParserInvoker::new(Arc::new(FakeParserService::new()), 1000);
        let parsed = invoker.invoke("hello world", None, None).await.unwrap();
        assert_eq!(parsed.parsed_text, "hello world");
    }

    #[tokio::test]
    async fn truncates_text_exceeding_the_token_budget() {
        let invoker = ParserInvoker::new(Arc::new(FakeParserService::new()), 1);
        let long_text: String = std::iter::repeat('a').take(100).collect();
        let parsed = invoker.invoke(&long_text, None, None).await.unwrap();
        assert_eq!(parsed.parsed_text.chars().count(), CHARS_PER_TOKEN_ESTIMATE);
    }
}
