/// Domain models for the transcription coordinator
///
/// Platform-agnostic data shapes shared across stages, the formatter, and the
/// emitted snapshot.
use serde::{Deserialize, Serialize};

/// An immutable, stable transcribed unit.
///
/// Ordered by `start_sec`; `end_sec` is monotone non-decreasing within a
/// single producer (the transcription stage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrToken {
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
    /// -1 = unassigned, >= 0 = speaker id, >= 100 = dummy placeholder id.
    pub speaker: i32,
    pub is_dummy: bool,
}

impl AsrToken {
    pub fn new(start_sec: f64, end_sec: f64, text: impl Into<String>) -> Self {
        Self {
            start_sec,
            end_sec,
            text: text.into(),
            speaker: -1,
            is_dummy: false,
        }
    }

    pub fn dummy(start_sec: f64, end_sec: f64) -> Self {
        Self {
            start_sec,
            end_sec,
            text: String::new(),
            speaker: 100,
            is_dummy: true,
        }
    }
}

/// The unstable tail of the live transcription, not yet committed as tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HypothesisBuffer {
    pub text: String,
    pub end_sec: f64,
}

/// A single formatted output line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub speaker: i32,
    pub text: String,
    pub beg: String,
    pub end: String,
    pub diff: f64,
}

/// One LLM summary, deduplicated by the `summary` field (I4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub timestamp: f64,
    pub summary: String,
    pub key_points: Vec<String>,
    pub text_length: usize,
}

/// One normalized parse of accumulated transcript text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTranscript {
    pub parsed_text: String,
    pub speakers: Option<String>,
    pub timestamps: Option<String>,
    pub char_count: usize,
    pub created_at: f64,
}

/// Summarizer-side stats surfaced in the snapshot when LLM inference is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStats {
    pub total_summaries: usize,
    pub chars_since_last_inference: usize,
    pub last_inference_wall: Option<f64>,
}

/// Parser-side stats surfaced in the snapshot when the parser is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserSnapshot {
    pub enabled: bool,
    pub total_parsed: usize,
    pub last_parsed: Option<ParsedTranscript>,
}

/// A single pull-interface emission. Produced by the Results Emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub lines: Vec<Line>,
    pub buffer_transcription: String,
    pub buffer_diarization: String,
    pub remaining_time_transcription: f64,
    pub remaining_time_diarization: f64,
    pub diarization_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Vec<Summary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_stats: Option<LlmStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_parser: Option<ParserSnapshot>,
}
