//! Parser service adapters

pub mod anthropic;

pub use anthropic::AnthropicParserService;
