/// ASR engine port
///
/// Defines the interface the transcription stage drives. Implementations own
/// a live streaming speech-to-text session; the coordinator only pushes PCM
/// and pulls stable tokens plus a live hypothesis.
use crate::domain::{AsrToken, HypothesisBuffer};
use crate::error::Result;
use async_trait::async_trait;

/// Port trait for a streaming ASR engine.
#[async_trait]
pub trait AsrEnginePort: Send + Sync {
    /// Pushes a PCM frame (mono, 16 kHz, samples in [-1, 1]).
    async fn push(&self, frame: &[f32]) -> Result<()>;

    /// Pulls zero or more newly stabilized tokens since the last call.
    async fn pull_tokens(&self) -> Result<Vec<AsrToken>>;

    /// Reads the current unstable hypothesis, if any.
    async fn hypothesis(&self) -> Result<Option<HypothesisBuffer>>;

    /// Single-character joiner used when concatenating committed token text.
    fn separator(&self) -> char {
        ' '
    }

    /// Splits text into sentences using the engine's own tokenizer, if it has
    /// one. `None` tells the Formatter to fall back to a `[.!?]+` split.
    fn split_sentences(&self, _text: &str) -> Option<Vec<String>> {
        None
    }

    /// Drains any remaining internal state, returning a trailing tail of text
    /// not yet surfaced through `pull_tokens`/`hypothesis`, if any.
    async fn finish(&self) -> Result<Option<String>>;
}
