/// Shared State & Coordinator
///
/// `SharedState` holds the canonical token sequence, live buffers, the
/// speaker-attribution watermark, and every cross-stage counter, guarded by
/// a single mutex (§3, §4.5). `Coordinator` is the façade stages and the
/// emitter talk to; it owns the only strong reference to `SharedState` and
/// hands stages narrow capabilities instead of a back-pointer to itself
/// (§9 "cyclic coordinator↔stage references").
use crate::config::CoordinatorConfig;
use crate::domain::{AsrToken, ParsedTranscript, Summary};
use crate::error::Result;
use crate::llm_summarizer::LlmSummarizer;
use crate::parser_stage::ParserInvoker;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

const PARSED_TRANSCRIPTS_CAP: usize = 50;

struct SharedState {
    tokens: Vec<AsrToken>,
    buffer_transcription: String,
    buffer_diarization: String,
    end_buffer_sec: f64,
    end_attributed_speaker_sec: f64,
    full_transcription: String,
    sep: char,
    beg_loop_wall: Instant,
    summaries: Vec<Summary>,
    parsed_transcripts: VecDeque<ParsedTranscript>,
    last_emitted_fingerprint: String,
    is_stopping: bool,
}

impl SharedState {
    fn new(sep: char) -> Self {
        Self {
            tokens: Vec::new(),
            buffer_transcription: String::new(),
            buffer_diarization: String::new(),
            end_buffer_sec: 0.0,
            end_attributed_speaker_sec: 0.0,
            full_transcription: String::new(),
            sep,
            beg_loop_wall: Instant::now(),
            summaries: Vec::new(),
            parsed_transcripts: VecDeque::new(),
            last_emitted_fingerprint: String::new(),
            is_stopping: false,
        }
    }
}

/// A coherent, point-in-time copy of the fields the Formatter and Results
/// Emitter need, taken under a single critical section (§5 ordering
/// guarantees).
pub struct StateView {
    pub tokens: Vec<AsrToken>,
    pub buffer_transcription: String,
    pub buffer_diarization: String,
    pub end_buffer_sec: f64,
    pub end_attributed_speaker_sec: f64,
    pub sep: char,
    pub beg_loop_wall: Instant,
    pub summaries: Vec<Summary>,
    pub parsed_transcripts_len: usize,
    pub last_parsed: Option<ParsedTranscript>,
    pub is_stopping: bool,
}

pub struct Coordinator {
    state: Mutex<SharedState>,
    config: CoordinatorConfig,
    llm_summarizer: Option<Arc<LlmSummarizer>>,
    parser: Option<ParserInvoker>,
    stages_remaining: AtomicUsize,
    total_parsed: AtomicUsize,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        sep: char,
        llm_summarizer: Option<Arc<LlmSummarizer>>,
        parser: Option<ParserInvoker>,
        stage_count: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SharedState::new(sep)),
            llm_summarizer,
            parser,
            config,
            stages_remaining: AtomicUsize::new(stage_count),
            total_parsed: AtomicUsize::new(0),
        })
    }

    pub fn llm_summarizer(&self) -> Option<Arc<LlmSummarizer>> {
        self.llm_summarizer.clone()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ---- Transcription stage capabilities ----

    pub async fn append_tokens(&self, new_tokens: Vec<AsrToken>) {
        let mut state = self.state.lock().await;
        for token in new_tokens {
            if !token.text.is_empty() {
                if !state.full_transcription.is_empty() {
                    let sep = state.sep;
                    state.full_transcription.push(sep);
                }
                state.full_transcription.push_str(&token.text);
            }
            state.end_buffer_sec = state.end_buffer_sec.max(token.end_sec);
            state.tokens.push(token);
        }
    }

    pub async fn bump_end_buffer(&self, end_sec: f64) {
        let mut state = self.state.lock().await;
        state.end_buffer_sec = state.end_buffer_sec.max(end_sec);
    }

    /// Substring-equality suppression (§9 Open Question, resolved in
    /// DESIGN.md): an unstable hypothesis already contained verbatim in the
    /// committed transcript is suppressed.
    pub async fn suppress_if_committed(&self, hypothesis_text: &str) -> bool {
        if hypothesis_text.is_empty() {
            return false;
        }
        let state = self.state.lock().await;
        state.full_transcription.contains(hypothesis_text)
    }

    pub async fn set_transcription_buffer(&self, text: String, end_sec: f64) {
        let mut state = self.state.lock().await;
        if !text.is_empty() {
            state.end_buffer_sec = state.end_buffer_sec.max(end_sec);
        }
        state.buffer_transcription = text;
    }

    pub async fn update_summarizer_text(&self, text: &str) {
        if let Some(summarizer) = &self.llm_summarizer {
            summarizer.update(text, None).await;
        }
    }

    pub async fn invoke_parser(&self, text: &str, speaker_hint: Option<&str>) -> Result<()> {
        let Some(parser) = &self.parser else {
            return Ok(());
        };
        let parsed = parser.invoke(text, speaker_hint, None).await?;
        let mut state = self.state.lock().await;
        if state.parsed_transcripts.len() >= PARSED_TRANSCRIPTS_CAP {
            state.parsed_transcripts.pop_front();
        }
        state.parsed_transcripts.push_back(parsed);
        self.total_parsed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // ---- Diarization stage capabilities ----

    pub async fn snapshot_tokens_and_watermark(&self) -> (Vec<AsrToken>, f64) {
        let state = self.state.lock().await;
        (state.tokens.clone(), state.end_attributed_speaker_sec)
    }

    /// Applies a new speaker-attribution watermark: tokens ending before it
    /// with no speaker inherit the previous speaker (or 0), tokens ending
    /// at/after it remain unattributed and their text is surfaced via
    /// `buffer_diarization` (§4.4).
    pub async fn apply_diarization_watermark(&self, new_watermark: f64) {
        let mut state = self.state.lock().await;
        if new_watermark <= state.end_attributed_speaker_sec {
            return;
        }
        let mut previous_speaker = 0;
        let mut unattributed_text = String::new();
        for token in state.tokens.iter_mut() {
            if token.speaker >= 0 {
                previous_speaker = token.speaker;
                continue;
            }
            if token.end_sec < new_watermark {
                token.speaker = previous_speaker;
            } else if !token.text.is_empty() {
                if !unattributed_text.is_empty() {
                    unattributed_text.push(' ');
                }
                unattributed_text.push_str(&token.text);
            }
        }
        state.end_attributed_speaker_sec = new_watermark;
        state.buffer_diarization = unattributed_text;
    }

    /// Appends a 1-second-wide placeholder token at the current buffer edge,
    /// used only when transcription is disabled and diarization is enabled,
    /// and only while the tail token is absent or already a dummy (§3 Design
    /// Notes supplement).
    pub async fn add_dummy_token(&self) {
        if self.config.features.transcription || !self.config.features.diarization {
            return;
        }
        let mut state = self.state.lock().await;
        let should_insert = state.tokens.last().map_or(true, |t| t.is_dummy);
        if !should_insert {
            return;
        }
        let start = state.end_buffer_sec;
        let end = start + 1.0;
        state.tokens.push(AsrToken::dummy(start, end));
        state.end_buffer_sec = end;
    }

    // ---- Shared read/write surface for the emitter ----

    pub async fn read_state(&self) -> StateView {
        let state = self.state.lock().await;
        StateView {
            tokens: state.tokens.clone(),
            buffer_transcription: state.buffer_transcription.clone(),
            buffer_diarization: state.buffer_diarization.clone(),
            end_buffer_sec: state.end_buffer_sec,
            end_attributed_speaker_sec: state.end_attributed_speaker_sec,
            sep: state.sep,
            beg_loop_wall: state.beg_loop_wall,
            summaries: state.summaries.clone(),
            parsed_transcripts_len: state.parsed_transcripts.len(),
            last_parsed: state.parsed_transcripts.back().cloned(),
            is_stopping: state.is_stopping,
        }
    }

    /// Appends a summary if, and only if, no existing summary has the same
    /// `summary` string (I4).
    pub async fn push_summary_deduped(&self, summary: Summary) -> bool {
        let mut state = self.state.lock().await;
        if state.summaries.iter().any(|s| s.summary == summary.summary) {
            return false;
        }
        state.summaries.push(summary);
        true
    }

    pub fn total_parsed(&self) -> usize {
        self.total_parsed.load(Ordering::Relaxed)
    }

    pub fn parser_enabled(&self) -> bool {
        self.parser.is_some()
    }

    pub fn llm_enabled(&self) -> bool {
        self.llm_summarizer.is_some()
    }

    pub async fn check_and_advance_fingerprint(&self, candidate: String, has_content: bool) -> bool {
        let mut state = self.state.lock().await;
        if candidate == state.last_emitted_fingerprint && !has_content {
            return false;
        }
        state.last_emitted_fingerprint = candidate;
        true
    }

    pub async fn set_stopping(&self) {
        let mut state = self.state.lock().await;
        state.is_stopping = true;
    }

    pub async fn is_stopping(&self) -> bool {
        self.state.lock().await.is_stopping
    }

    pub fn mark_stage_finished(&self) {
        self.stages_remaining.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn all_stages_finished(&self) -> bool {
        self.stages_remaining.load(Ordering::Acquire) == 0
    }

    /// Tears down and replaces SharedState so a subsequent session starts
    /// from an instance equivalent to a brand-new one (R2), without
    /// dropping the process.
    pub async fn force_reset(&self, stage_count: usize) {
        let sep = {
            let state = self.state.lock().await;
            state.sep
        };
        let mut state = self.state.lock().await;
        *state = SharedState::new(sep);
        drop(state);
        self.stages_remaining.store(stage_count, Ordering::Release);
        self.total_parsed.store(0, Ordering::Relaxed);
        if let Some(summarizer) = &self.llm_summarizer {
            summarizer.reset().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AsrToken;

    fn test_coordinator() -> Arc<Coordinator> {
        Coordinator::new(CoordinatorConfig::default(), ' ', None, None, 1)
    }

    #[tokio::test]
    async fn append_tokens_builds_full_transcription() {
        let c = test_coordinator();
        c.append_tokens(vec![AsrToken::new(0.0, 0.5, "hello"), AsrToken::new(0.5, 1.0, "world")])
            .await;
        let view = c.read_state().await;
        assert_eq!(view.tokens.len(), 2);
        assert_eq!(view.end_buffer_sec, 1.0);
    }

    #[tokio::test]
    async fn suppresses_hypothesis_contained_in_committed_text() {
        let c = test_coordinator();
        c.append_tokens(vec![AsrToken::new(0.0, 0.5, "hello world")]).await;
        assert!(c.suppress_if_committed("hello").await);
        assert!(!c.suppress_if_committed("goodbye").await);
    }

    #[tokio::test]
    async fn summary_dedup_rejects_identical_text() {
        let c = test_coordinator();
        let s = Summary {
            timestamp: 0.0,
            summary: "same".to_string(),
            key_points: vec![],
            text_length: 4,
        };
        assert!(c.push_summary_deduped(s.clone()).await);
        assert!(!c.push_summary_deduped(s).await);
        assert_eq!(c.read_state().await.summaries.len(), 1);
    }

    #[tokio::test]
    async fn diarization_watermark_attributes_prefix_only() {
        let c = test_coordinator();
        c.append_tokens(vec![AsrToken::new(0.0, 1.0, "a"), AsrToken::new(1.0, 3.0, "b")])
            .await;
        c.apply_diarization_watermark(2.0).await;
        let view = c.read_state().await;
        assert_eq!(view.tokens[0].speaker, 0);
        assert_eq!(view.tokens[1].speaker, -1);
        assert_eq!(view.end_attributed_speaker_sec, 2.0);
    }

    #[tokio::test]
    async fn force_reset_clears_tokens_and_counters() {
        let c = test_coordinator();
        c.append_tokens(vec![AsrToken::new(0.0, 1.0, "a")]).await;
        c.force_reset(1).await;
        let view = c.read_state().await;
        assert!(view.tokens.is_empty());
        assert_eq!(view.end_buffer_sec, 0.0);
    }

    #[tokio::test]
    async fn parsed_transcripts_stay_bounded_at_cap() {
        use crate::parser_stage::ParserInvoker;
        use crate::ports::mocks::FakeParserService;
        let parser = ParserInvoker::new(Arc::new(FakeParserService::new()), 1000);
        let c = Coordinator::new(CoordinatorConfig::default(), ' ', None, Some(parser), 1);
        for i in 0..(PARSED_TRANSCRIPTS_CAP + 10) {
            c.invoke_parser(&format!("chunk {i}"), None).await.unwrap();
        }
        let view = c.read_state().await;
        assert_eq!(view.parsed_transcripts_len, PARSED_TRANSCRIPTS_CAP);
        assert_eq!(c.total_parsed(), PARSED_TRANSCRIPTS_CAP + 10);
        assert_eq!(view.last_parsed.unwrap().parsed_text, format!("chunk {}", PARSED_TRANSCRIPTS_CAP + 9));
    }

    #[tokio::test]
    async fn set_stopping_is_independent_of_decoder_write_path() {
        // Mirrors B3: a decoder write/flush timeout never touches
        // `is_stopping` directly, only `process_audio(&[])` does.
        let c = test_coordinator();
        assert!(!c.is_stopping().await);
        c.set_stopping().await;
        assert!(c.is_stopping().await);
    }
}
