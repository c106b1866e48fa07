//! LLM service adapters
//!
//! Reference implementations of `LlmServicePort`.

pub mod anthropic;

pub use anthropic::AnthropicService;
