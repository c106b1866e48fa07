/// Streaming transcription coordinator
///
/// Wires the Decoder Supervisor, Transcription/Diarization stages, the
/// Results Emitter, LLM Summarizer, Parser, and Watchdog into one pipeline
/// behind a push/pull boundary (§6): `process_audio` accepts container
/// bytes, `result_stream` yields a `Stream` of `Snapshot`s.
pub mod adapters;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod emitter;
pub mod error;
pub mod formatter;
pub mod llm_summarizer;
pub mod parser_stage;
pub mod ports;
pub mod stages;
pub mod state;
pub mod watchdog;

use crate::config::CoordinatorConfig;
use crate::decoder::{DecoderCommandFactory, DecoderSupervisor};
use crate::domain::Snapshot;
use crate::emitter::ResultsEmitter;
use crate::error::Result;
use crate::llm_summarizer::LlmSummarizer;
use crate::parser_stage::ParserInvoker;
use crate::ports::asr::AsrEnginePort;
use crate::ports::diarization::DiarizationEnginePort;
use crate::ports::llm::LlmServicePort;
use crate::ports::parser::ParserServicePort;
use crate::stages::{DiarizationStage, StageQueues, TranscriptionStage};
use crate::state::Coordinator;
use crate::watchdog::Watchdog;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// External collaborators the pipeline is constructed with. Swappable per
/// §6's "external collaborators with contracts" boundary.
pub struct Collaborators {
    pub asr: Arc<dyn AsrEnginePort>,
    pub diarization: Option<Arc<dyn DiarizationEnginePort>>,
    pub llm: Option<Arc<dyn LlmServicePort>>,
    pub parser: Option<Arc<dyn ParserServicePort>>,
    pub decoder_command_factory: DecoderCommandFactory,
}

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Owns every task handle for one transcription session. Dropping it does
/// not stop the pipeline; call `process_audio(&[])` for orderly shutdown.
pub struct Pipeline {
    coordinator: Arc<Coordinator>,
    decoder: Arc<DecoderSupervisor>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn start(config: CoordinatorConfig, collaborators: Collaborators) -> Result<(Self, impl futures_util::Stream<Item = Snapshot>)> {
        let config = config.validate()?;
        let cancel = CancellationToken::new();
        let loop_start = Instant::now();

        let diarization_enabled = config.features.diarization && collaborators.diarization.is_some();
        let stage_count = if config.features.transcription && diarization_enabled {
            2
        } else {
            1
        };

        let llm_summarizer_and_rx = if config.features.llm_inference {
            collaborators.llm.clone().map(|llm| {
                LlmSummarizer::new(
                    llm,
                    config.llm.summary_interval_seconds,
                    config.llm.new_text_trigger_chars,
                    loop_start,
                )
            })
        } else {
            None
        };
        let (llm_summarizer, summary_rx) = match llm_summarizer_and_rx {
            Some((s, rx)) => (Some(s), Some(rx)),
            None => (None, None),
        };

        let parser_invoker = collaborators
            .parser
            .clone()
            .map(|p| ParserInvoker::new(p, config.parser.max_output_tokens));

        let sep = collaborators.asr.separator();
        let coordinator = Coordinator::new(config.clone(), sep, llm_summarizer, parser_invoker, stage_count);

        if let Some(mut summary_rx) = summary_rx {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                while let Some(summary) = summary_rx.recv().await {
                    coordinator.push_summary_deduped(summary).await;
                }
            });
        }

        if let Some(summarizer) = coordinator.llm_summarizer() {
            let cancel = cancel.clone();
            tokio::spawn(summarizer.run(cancel));
        }

        let decoder = Arc::new(DecoderSupervisor::spawn(collaborators.decoder_command_factory)?);

        let queues = StageQueues::new();
        let transcription_handle = if config.features.transcription {
            let stage = TranscriptionStage::new(
                Arc::clone(&collaborators.asr),
                Arc::clone(&coordinator),
                Duration::from_secs_f64(config.parser.trigger_interval_seconds),
            );
            Some(tokio::spawn(stage.run(queues.transcription_rx)))
        } else {
            tokio::spawn(drain_queue(queues.transcription_rx));
            None
        };

        let diarization_handle = if diarization_enabled {
            let diarization_engine = collaborators.diarization.clone().expect("checked above");
            let stage = DiarizationStage::new(diarization_engine, Arc::clone(&coordinator));
            Some(tokio::spawn(stage.run(queues.diarization_rx)))
        } else {
            tokio::spawn(drain_queue(queues.diarization_rx));
            None
        };

        tokio::spawn(Arc::clone(&decoder).run(
            queues.transcription_tx,
            queues.diarization_tx,
            config.min_chunk_bytes(),
            cancel.clone(),
        ));

        let mut stage_handles = Vec::new();
        if let Some(h) = transcription_handle {
            stage_handles.push(("transcription", h));
        }
        if let Some(h) = diarization_handle {
            stage_handles.push(("diarization", h));
        }
        let watchdog = Arc::new(Watchdog::new(Arc::clone(&decoder), Arc::clone(&coordinator), stage_handles));
        tokio::spawn(Arc::clone(&watchdog).run(cancel.clone()));

        let emitter = ResultsEmitter::new(
            Arc::clone(&coordinator),
            Arc::clone(&collaborators.asr),
            diarization_enabled,
        );
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        tokio::spawn(emitter.run(snapshot_tx));

        let pipeline = Self {
            coordinator,
            decoder,
            cancel,
        };
        Ok((pipeline, ReceiverStream::new(snapshot_rx)))
    }

    /// Push interface (§6): an empty payload is the stop signal. Subsequent
    /// pushes after stopping are ignored with a warning.
    pub async fn process_audio(&self, bytes: &[u8]) {
        if self.coordinator.is_stopping().await {
            if !bytes.is_empty() {
                log::warn!("audio pushed after stop signal, ignoring");
            }
            return;
        }

        if bytes.is_empty() {
            self.coordinator.set_stopping().await;
            self.decoder.cleanup().await;
            return;
        }

        self.decoder.push(bytes).await;
    }

    /// Tears down SharedState and resets cross-stage counters so a fresh
    /// session can begin without dropping the process (§3 supplement).
    pub async fn force_reset(&self, stage_count: usize) {
        self.coordinator.force_reset(stage_count).await;
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Drains a stage queue whose stage is disabled by configuration, keeping
/// the decoder's sends from failing without counting toward stage
/// completion (it is not part of `stage_count`).
async fn drain_queue(mut rx: mpsc::Receiver<stages::StageMessage>) {
    while let Some(msg) = rx.recv().await {
        if matches!(msg, stages::StageMessage::EndOfStream) {
            break;
        }
    }
}
