/// Transcription Stage
///
/// Consumes PCM frames, drives the ASR engine, appends newly stable tokens
/// to shared state, and maintains the Parser trigger's stage-local
/// accumulator.
use crate::domain::AsrToken;
use crate::ports::asr::AsrEnginePort;
use crate::stages::queues::StageMessage;
use crate::state::Coordinator;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub struct TranscriptionStage {
    asr: Arc<dyn AsrEnginePort>,
    coordinator: Arc<Coordinator>,
    parser_trigger_interval: Duration,
}

impl TranscriptionStage {
    pub fn new(
        asr: Arc<dyn AsrEnginePort>,
        coordinator: Arc<Coordinator>,
        parser_trigger_interval: Duration,
    ) -> Self {
        Self {
            asr,
            coordinator,
            parser_trigger_interval,
        }
    }

    /// Runs until the queue yields `EndOfStream` or is closed.
    pub async fn run(self, mut rx: mpsc::Receiver<StageMessage>) {
        let mut parser_accumulator = String::new();
        let mut last_parser_trigger = Instant::now();
        let mut last_speaker_hint: Option<i32> = None;

        while let Some(msg) = rx.recv().await {
            match msg {
                StageMessage::Frame(frame) => {
                    if let Err(e) = self.process_frame(&frame).await {
                        log::warn!("transcription stage error on frame: {e}");
                        continue;
                    }

                    let new_tokens = match self.asr.pull_tokens().await {
                        Ok(tokens) => tokens,
                        Err(e) => {
                            log::warn!("failed to pull ASR tokens: {e}");
                            Vec::new()
                        }
                    };

                    if !new_tokens.is_empty() {
                        for token in &new_tokens {
                            parser_accumulator.push_str(&token.text);
                            parser_accumulator.push(self.asr.separator());
                            last_speaker_hint = Some(token.speaker);
                        }
                        let last_end = new_tokens.last().map(|t| t.end_sec);
                        self.coordinator.append_tokens(new_tokens).await;
                        if let Some(end) = last_end {
                            self.coordinator.bump_end_buffer(end).await;
                        }
                    }

                    self.maybe_suppress_and_set_hypothesis().await;

                    if last_parser_trigger.elapsed() >= self.parser_trigger_interval
                        && !parser_accumulator.is_empty()
                    {
                        self.fire_parser(
                            std::mem::take(&mut parser_accumulator),
                            last_speaker_hint,
                        );
                        last_parser_trigger = Instant::now();
                    }
                }
                StageMessage::EndOfStream => {
                    if !parser_accumulator.is_empty() {
                        self.fire_parser(std::mem::take(&mut parser_accumulator), last_speaker_hint);
                    }
                    match self.asr.finish().await {
                        Ok(Some(tail)) => self.coordinator.update_summarizer_text(&tail).await,
                        Ok(None) => {}
                        Err(e) => log::warn!("ASR finish failed: {e}"),
                    }
                    self.coordinator.mark_stage_finished();
                    break;
                }
            }
        }
    }

    async fn process_frame(&self, frame: &[f32]) -> crate::error::Result<()> {
        self.asr.push(frame).await
    }

    async fn maybe_suppress_and_set_hypothesis(&self) {
        let hyp = match self.asr.hypothesis().await {
            Ok(h) => h,
            Err(e) => {
                log::warn!("failed to read ASR hypothesis: {e}");
                return;
            }
        };
        let Some(hyp) = hyp else {
            return;
        };

        let suppressed = self.coordinator.suppress_if_committed(&hyp.text).await;
        let buffer_text = if suppressed { String::new() } else { hyp.text };
        self.coordinator
            .set_transcription_buffer(buffer_text, hyp.end_sec)
            .await;
    }

    fn fire_parser(&self, text: String, speaker_hint: Option<i32>) {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            let speaker_label = speaker_hint.map(|s| s.to_string());
            if let Err(e) = coordinator
                .invoke_parser(&text, speaker_label.as_deref())
                .await
            {
                log::warn!("parser invocation failed: {e}");
            }
        });
    }
}

/// Returns the text of `tokens` joined by `sep` — used by the stage to build
/// the committed-text append for `full_transcription`.
pub fn join_token_text(tokens: &[AsrToken], sep: char) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(&sep.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_token_text_with_separator() {
        let tokens = vec![AsrToken::new(0.0, 0.5, "hello"), AsrToken::new(0.5, 1.0, "world")];
        assert_eq!(join_token_text(&tokens, ' '), "hello world");
    }
}
