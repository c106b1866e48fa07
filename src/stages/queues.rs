/// Stage queues
///
/// Two bounded, single-producer/single-consumer channels carrying PCM frames
/// from the Decoder Supervisor to the Transcription and Diarization stages.
use tokio::sync::mpsc;

/// Element carried on a stage queue: a PCM frame or the end-of-stream
/// sentinel.
#[derive(Debug, Clone)]
pub enum StageMessage {
    Frame(Vec<f32>),
    EndOfStream,
}

/// The diarization queue's soft capacity (§4.1, §4.2, B2). Enforced by the
/// decoder's drop policy, not by channel backpressure, since the producer
/// must never block on a full diarization queue.
pub const DIARIZATION_QUEUE_SOFT_CAP: usize = 5;

/// Channel capacity used for the underlying `tokio::sync::mpsc` transport.
/// The transcription queue is "effectively unbounded" per §4.2; a generous
/// fixed capacity avoids unbounded memory growth while never being the
/// limiting factor in practice (the ASR engine's per-call cost is).
const TRANSCRIPTION_QUEUE_CAPACITY: usize = 4096;
const DIARIZATION_QUEUE_CAPACITY: usize = DIARIZATION_QUEUE_SOFT_CAP + 1;

pub struct StageQueues {
    pub transcription_tx: mpsc::Sender<StageMessage>,
    pub transcription_rx: mpsc::Receiver<StageMessage>,
    pub diarization_tx: mpsc::Sender<StageMessage>,
    pub diarization_rx: mpsc::Receiver<StageMessage>,
}

impl StageQueues {
    pub fn new() -> Self {
        let (transcription_tx, transcription_rx) = mpsc::channel(TRANSCRIPTION_QUEUE_CAPACITY);
        let (diarization_tx, diarization_rx) = mpsc::channel(DIARIZATION_QUEUE_CAPACITY);
        Self {
            transcription_tx,
            transcription_rx,
            diarization_tx,
            diarization_rx,
        }
    }
}

impl Default for StageQueues {
    fn default() -> Self {
        Self::new()
    }
}
