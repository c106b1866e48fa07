/// Parser service port
///
/// Structured transcript normalizer, driven from the transcription stage as
/// a fire-and-forget task.
use crate::domain::ParsedTranscript;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ParserServicePort: Send + Sync {
    /// Normalizes `text` into a `ParsedTranscript`. `speakers`/`timestamps`
    /// are optional hints (e.g. a speaker label for the accumulated span).
    async fn parse(
        &self,
        text: &str,
        speakers: Option<&str>,
        timestamps: Option<&str>,
    ) -> Result<ParsedTranscript>;

    fn model_id(&self) -> &str;
}
