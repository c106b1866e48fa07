//! In-memory fakes for the external-collaborator ports, used by tests.

use crate::domain::{AsrToken, HypothesisBuffer, ParsedTranscript};
use crate::error::Result;
use crate::ports::asr::AsrEnginePort;
use crate::ports::diarization::DiarizationEnginePort;
use crate::ports::llm::{LlmServicePort, LlmSummaryResponse};
use crate::ports::parser::ParserServicePort;
use async_trait::async_trait;
use std::sync::Mutex;

/// Fake ASR engine: tokens to emit and an optional hypothesis are queued in
/// by the test; `push` just counts frames.
#[derive(Default)]
pub struct FakeAsrEngine {
    pub pending_tokens: Mutex<Vec<AsrToken>>,
    pub hypothesis_text: Mutex<Option<HypothesisBuffer>>,
    pub pushed_frames: Mutex<usize>,
    pub finish_tail: Mutex<Option<String>>,
}

impl FakeAsrEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_tokens(&self, tokens: Vec<AsrToken>) {
        self.pending_tokens.lock().unwrap().extend(tokens);
    }

    pub fn set_hypothesis(&self, hyp: Option<HypothesisBuffer>) {
        *self.hypothesis_text.lock().unwrap() = hyp;
    }
}

#[async_trait]
impl AsrEnginePort for FakeAsrEngine {
    async fn push(&self, _frame: &[f32]) -> Result<()> {
        *self.pushed_frames.lock().unwrap() += 1;
        Ok(())
    }

    async fn pull_tokens(&self) -> Result<Vec<AsrToken>> {
        Ok(std::mem::take(&mut *self.pending_tokens.lock().unwrap()))
    }

    async fn hypothesis(&self) -> Result<Option<HypothesisBuffer>> {
        Ok(self.hypothesis_text.lock().unwrap().clone())
    }

    async fn finish(&self) -> Result<Option<String>> {
        Ok(self.finish_tail.lock().unwrap().take())
    }
}

/// Fake diarizer: assigns speaker 0 to everything up to `advance_to_sec`,
/// set by the test ahead of each call.
#[derive(Default)]
pub struct FakeDiarizationEngine {
    pub advance_to_sec: Mutex<f64>,
    pub pushed_frames: Mutex<usize>,
}

impl FakeDiarizationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_watermark(&self, sec: f64) {
        *self.advance_to_sec.lock().unwrap() = sec;
    }
}

#[async_trait]
impl DiarizationEnginePort for FakeDiarizationEngine {
    async fn push(&self, _frame: &[f32]) -> Result<()> {
        *self.pushed_frames.lock().unwrap() += 1;
        Ok(())
    }

    async fn assign_speakers(
        &self,
        _end_attributed_speaker_sec: f64,
        _tokens: &[AsrToken],
    ) -> Result<f64> {
        Ok(*self.advance_to_sec.lock().unwrap())
    }
}

/// Fake LLM service: returns a canned (possibly repeating) summary.
pub struct FakeLlmService {
    pub model: String,
    pub responses: Mutex<Vec<LlmSummaryResponse>>,
}

impl FakeLlmService {
    pub fn new(responses: Vec<LlmSummaryResponse>) -> Self {
        Self {
            model: "fake-llm".to_string(),
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl LlmServicePort for FakeLlmService {
    async fn summarize(&self, _transcript: &str) -> Result<LlmSummaryResponse> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else if let Some(r) = responses.first() {
            Ok(r.clone())
        } else {
            Ok(LlmSummaryResponse {
                summary: String::new(),
                key_points: Vec::new(),
            })
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Fake parser: echoes the input text back as the parsed text.
pub struct FakeParserService {
    pub model: String,
    pub calls: Mutex<usize>,
}

impl Default for FakeParserService {
    fn default() -> Self {
        Self {
            model: "fake-parser".to_string(),
            calls: Mutex::new(0),
        }
    }
}

impl FakeParserService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParserServicePort for FakeParserService {
    async fn parse(
        &self,
        text: &str,
        speakers: Option<&str>,
        timestamps: Option<&str>,
    ) -> Result<ParsedTranscript> {
        *self.calls.lock().unwrap() += 1;
        Ok(ParsedTranscript {
            parsed_text: text.to_string(),
            speakers: speakers.map(|s| s.to_string()),
            timestamps: timestamps.map(|s| s.to_string()),
            char_count: text.chars().count(),
            created_at: 0.0,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
