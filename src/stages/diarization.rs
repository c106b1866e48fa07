/// Diarization Stage
///
/// Consumes PCM frames, drives the diarization engine, and advances the
/// speaker-attribution watermark (§4.4). When transcription is disabled,
/// also maintains the dummy-token placeholder so diarization-only sessions
/// still produce a token timeline.
use crate::ports::diarization::DiarizationEnginePort;
use crate::stages::queues::StageMessage;
use crate::state::Coordinator;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct DiarizationStage {
    diarization: Arc<dyn DiarizationEnginePort>,
    coordinator: Arc<Coordinator>,
}

impl DiarizationStage {
    pub fn new(diarization: Arc<dyn DiarizationEnginePort>, coordinator: Arc<Coordinator>) -> Self {
        Self {
            diarization,
            coordinator,
        }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<StageMessage>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                StageMessage::Frame(frame) => {
                    if let Err(e) = self.diarization.push(&frame).await {
                        log::warn!("diarization stage error on frame: {e}");
                        continue;
                    }

                    self.coordinator.add_dummy_token().await;

                    let (tokens, watermark) = self.coordinator.snapshot_tokens_and_watermark().await;
                    match self.diarization.assign_speakers(watermark, &tokens).await {
                        Ok(new_watermark) => {
                            self.coordinator
                                .apply_diarization_watermark(new_watermark)
                                .await;
                        }
                        Err(e) => log::warn!("failed to assign speakers: {e}"),
                    }
                }
                StageMessage::EndOfStream => {
                    self.coordinator.mark_stage_finished();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::domain::AsrToken;
    use crate::ports::mocks::FakeDiarizationEngine;

    #[tokio::test]
    async fn frame_advances_watermark_and_end_of_stream_marks_finished() {
        let coordinator = Coordinator::new(CoordinatorConfig::default(), ' ', None, None, 1);
        coordinator
            .append_tokens(vec![AsrToken::new(0.0, 1.0, "a"), AsrToken::new(1.0, 2.0, "b")])
            .await;

        let diarizer = Arc::new(FakeDiarizationEngine::new());
        diarizer.set_watermark(1.5);
        let stage = DiarizationStage::new(diarizer, Arc::clone(&coordinator));

        let (tx, rx) = mpsc::channel(4);
        tx.send(StageMessage::Frame(vec![0.0; 10])).await.unwrap();
        tx.send(StageMessage::EndOfStream).await.unwrap();
        drop(tx);
        stage.run(rx).await;

        let view = coordinator.read_state().await;
        assert_eq!(view.end_attributed_speaker_sec, 1.5);
        assert_eq!(view.tokens[0].speaker, 0);
        assert_eq!(view.tokens[1].speaker, -1);
        assert!(coordinator.all_stages_finished());
    }
}
