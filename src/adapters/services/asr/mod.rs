//! ASR service adapters
//!
//! Reference implementation of `AsrEnginePort` against a real streaming
//! speech-to-text provider.

mod deepgram_streaming;

pub use deepgram_streaming::DeepgramStreamingAsr;
