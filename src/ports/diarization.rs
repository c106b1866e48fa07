/// Diarization engine port
///
/// Implementations own a live diarization session; the coordinator pushes
/// PCM and asks it to assign speakers over a snapshot of the token list.
use crate::domain::AsrToken;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait DiarizationEnginePort: Send + Sync {
    /// Pushes a coarser PCM frame (accumulated to >= 2.0s by the decoder).
    async fn push(&self, frame: &[f32]) -> Result<()>;

    /// Assigns speakers to the prefix of `tokens` ending at or before the
    /// current watermark, given a snapshot of the token list. Returns the
    /// new `end_attributed_speaker_sec` watermark.
    async fn assign_speakers(
        &self,
        end_attributed_speaker_sec: f64,
        tokens: &[AsrToken],
    ) -> Result<f64>;
}
