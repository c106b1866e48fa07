/// Error types for the transcription coordinator
///
/// Uses thiserror for ergonomic error handling with proper Display implementations.
use thiserror::Error;

/// Main error type for the coordinator and its adapters
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decoder error: {0}")]
    Decoder(String),

    #[error("transcription engine error: {0}")]
    Transcription(String),

    #[error("diarization engine error: {0}")]
    Diarization(String),

    #[error("LLM service error: {0}")]
    Llm(String),

    #[error("parser service error: {0}")]
    Parser(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Convert CoordinatorError to a string for boundary crossings (FFI, IPC, logs)
impl From<CoordinatorError> for String {
    fn from(error: CoordinatorError) -> Self {
        error.to_string()
    }
}
