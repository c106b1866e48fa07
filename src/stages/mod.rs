pub mod diarization;
pub mod queues;
pub mod transcription;

pub use diarization::DiarizationStage;
pub use queues::{StageMessage, StageQueues};
pub use transcription::TranscriptionStage;
