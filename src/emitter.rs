/// Results Emitter
///
/// Polls `Coordinator` every 200 ms, formats the current token list into
/// lines, applies the Simplified→Traditional post-conversion, and yields a
/// `Snapshot` whenever content changed (§4.7). On orderly shutdown it runs
/// the final-flush sequence before terminating the stream.
use crate::domain::{LlmStats, ParserSnapshot, Snapshot};
use crate::formatter;
use crate::ports::asr::AsrEnginePort;
use crate::state::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const EMIT_INTERVAL: Duration = Duration::from_millis(200);
const FINAL_SUMMARY_POLL_TIMEOUT: Duration = Duration::from_secs(10);
const FINAL_SUMMARY_POLL_STEP: Duration = Duration::from_millis(500);

pub struct ResultsEmitter {
    coordinator: Arc<Coordinator>,
    asr: Arc<dyn AsrEnginePort>,
    diarization_enabled: bool,
}

impl ResultsEmitter {
    pub fn new(coordinator: Arc<Coordinator>, asr: Arc<dyn AsrEnginePort>, diarization_enabled: bool) -> Self {
        Self {
            coordinator,
            asr,
            diarization_enabled,
        }
    }

    pub async fn run(self, snapshot_tx: mpsc::Sender<Snapshot>) {
        loop {
            tokio::time::sleep(EMIT_INTERVAL).await;

            if self.coordinator.is_stopping().await && self.coordinator.all_stages_finished() {
                self.final_flush(&snapshot_tx).await;
                break;
            }

            let (snapshot, should_emit) = self.build_snapshot(false).await;
            if should_emit && snapshot_tx.send(snapshot).await.is_err() {
                break;
            }
        }
    }

    async fn final_flush(&self, snapshot_tx: &mpsc::Sender<Snapshot>) {
        match self.asr.finish().await {
            Ok(Some(tail)) => self.coordinator.update_summarizer_text(&tail).await,
            Ok(None) => {}
            Err(e) => log::warn!("final ASR finish failed: {e}"),
        }

        if let Some(summarizer) = self.coordinator.llm_summarizer() {
            if summarizer.chars_since_last_inference() > 0 {
                let before = self.coordinator.read_state().await.summaries.len();
                summarizer.force_inference().await;
                let deadline = tokio::time::Instant::now() + FINAL_SUMMARY_POLL_TIMEOUT;
                while tokio::time::Instant::now() < deadline {
                    if self.coordinator.read_state().await.summaries.len() > before {
                        break;
                    }
                    tokio::time::sleep(FINAL_SUMMARY_POLL_STEP).await;
                }
            }
        }

        let (mut snapshot, _) = self.build_snapshot(true).await;
        snapshot.remaining_time_transcription = 0.0;
        snapshot.remaining_time_diarization = 0.0;
        let _ = snapshot_tx.send(snapshot).await;
    }

    async fn build_snapshot(&self, force_emit: bool) -> (Snapshot, bool) {
        let view = self.coordinator.read_state().await;

        let joined: String = view
            .tokens
            .iter()
            .filter(|t| !t.text.is_empty())
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(&view.sep.to_string());
        let split = self.asr.split_sentences(&joined);
        let sentence_mode_available = split.is_some();

        let raw_lines = formatter::format_lines(
            &view.tokens,
            view.sep,
            view.end_attributed_speaker_sec,
            split,
            sentence_mode_available,
        );
        let lines: Vec<_> = raw_lines
            .into_iter()
            .map(|mut l| {
                l.text = formatter::to_traditional(&l.text);
                l
            })
            .collect();

        let buffer_transcription = formatter::to_traditional(&view.buffer_transcription);
        let raw_buffer_diarization =
            formatter::unattributed_tail_text(&view.tokens, view.end_attributed_speaker_sec);
        let buffer_diarization = formatter::to_traditional(&raw_buffer_diarization);

        let elapsed = view.beg_loop_wall.elapsed().as_secs_f64();
        let remaining_time_transcription = (elapsed - view.end_buffer_sec).max(0.0);
        let last_token_end = view.tokens.last().map(|t| t.end_sec).unwrap_or(0.0);
        let remaining_time_diarization =
            (view.end_buffer_sec.max(last_token_end) - view.end_attributed_speaker_sec).max(0.0);

        let fingerprint = format!(
            "{}|{}|{}",
            lines
                .iter()
                .map(|l| format!("{} {}", l.speaker, l.text))
                .collect::<Vec<_>>()
                .join("|"),
            buffer_transcription,
            buffer_diarization
        );
        let has_content = !lines.is_empty() || !buffer_transcription.is_empty() || !buffer_diarization.is_empty();
        let should_emit = force_emit
            || self
                .coordinator
                .check_and_advance_fingerprint(fingerprint, has_content)
                .await;

        let summaries = if view.summaries.is_empty() {
            None
        } else {
            Some(view.summaries)
        };

        let llm_stats = self.coordinator.llm_summarizer().map(|s| LlmStats {
            total_summaries: s.total_summaries(),
            chars_since_last_inference: s.chars_since_last_inference(),
            last_inference_wall: None,
        });

        let transcript_parser = if self.coordinator.parser_enabled() {
            Some(ParserSnapshot {
                enabled: self.coordinator.parser_enabled(),
                total_parsed: self.coordinator.total_parsed(),
                last_parsed: view.last_parsed,
            })
        } else {
            None
        };

        let snapshot = Snapshot {
            lines,
            buffer_transcription,
            buffer_diarization,
            remaining_time_transcription,
            remaining_time_diarization,
            diarization_enabled: self.diarization_enabled,
            summaries,
            llm_stats,
            transcript_parser,
        };
        (snapshot, should_emit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::domain::AsrToken;
    use crate::ports::mocks::FakeAsrEngine;
    use crate::state::Coordinator;

    fn emitter_with(coordinator: Arc<Coordinator>, asr: Arc<FakeAsrEngine>) -> ResultsEmitter {
        ResultsEmitter::new(coordinator, asr, false)
    }

    #[tokio::test]
    async fn unchanged_snapshot_is_suppressed_by_fingerprint() {
        let coordinator = Coordinator::new(CoordinatorConfig::default(), ' ', None, None, 1);
        let asr = Arc::new(FakeAsrEngine::new());
        let emitter = emitter_with(Arc::clone(&coordinator), Arc::clone(&asr));

        coordinator
            .append_tokens(vec![AsrToken::new(0.0, 0.5, "hello")])
            .await;
        let (_, first_emit) = emitter.build_snapshot(false).await;
        assert!(first_emit, "first snapshot with content should emit");

        let (_, second_emit) = emitter.build_snapshot(false).await;
        assert!(!second_emit, "identical follow-up snapshot should be suppressed");
    }

    #[tokio::test]
    async fn final_flush_zeroes_remaining_times_and_emits_once() {
        let coordinator = Coordinator::new(CoordinatorConfig::default(), ' ', None, None, 1);
        let asr = Arc::new(FakeAsrEngine::new());
        let emitter = emitter_with(Arc::clone(&coordinator), Arc::clone(&asr));

        coordinator
            .append_tokens(vec![AsrToken::new(0.0, 0.5, "hello")])
            .await;
        let (tx, mut rx) = mpsc::channel(4);
        emitter.final_flush(&tx).await;
        drop(tx);

        let snapshot = rx.recv().await.expect("final flush should emit exactly one snapshot");
        assert_eq!(snapshot.remaining_time_transcription, 0.0);
        assert_eq!(snapshot.remaining_time_diarization, 0.0);
        assert!(rx.recv().await.is_none(), "no further snapshots after final flush");
    }
}
