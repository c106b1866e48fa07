/// Coordinator configuration
///
/// A validated configuration record, built from any source (flags, env, file —
/// the source itself is assumed external per the push/pull interface boundary).
/// Mirrors the constraints the original Python entrypoint enforced in
/// `_validate_args`.
use crate::error::{CoordinatorError, Result};

pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const BYTES_PER_SAMPLE: u32 = 2;

/// Feature flags toggling optional stages.
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    pub transcription: bool,
    pub diarization: bool,
    pub vad: bool,
    pub vac: bool,
    pub confidence_validation: bool,
    pub llm_inference: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            transcription: true,
            diarization: false,
            vad: true,
            vac: false,
            confidence_validation: false,
            llm_inference: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub fast_model_id: String,
    pub base_model_id: String,
    pub summary_interval_seconds: f64,
    pub new_text_trigger_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            fast_model_id: "gpt-4o-mini".to_string(),
            base_model_id: "gpt-4o".to_string(),
            summary_interval_seconds: 1.0,
            new_text_trigger_chars: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub trigger_interval_seconds: f64,
    pub max_output_tokens: u32,
    pub model_id: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            trigger_interval_seconds: 1.0,
            max_output_tokens: 33_000,
            model_id: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub min_chunk_size: f64,
    pub buffer_trimming_sec: f64,
    pub vac_chunk_size: f64,
    pub features: FeatureFlags,
    pub llm: LlmConfig,
    pub parser: ParserConfig,
    pub log_level: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 0.5,
            buffer_trimming_sec: 15.0,
            vac_chunk_size: 0.04,
            features: FeatureFlags::default(),
            llm: LlmConfig::default(),
            parser: ParserConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Validates the configuration per the constraints enumerated in §6.
    /// Rejected synchronously before the pipeline starts (a fatal, not a
    /// per-stage, error).
    pub fn validate(self) -> Result<Self> {
        if self.min_chunk_size <= 0.0 {
            return Err(CoordinatorError::Config(
                "min_chunk_size must be > 0".to_string(),
            ));
        }
        if self.buffer_trimming_sec <= 0.0 {
            return Err(CoordinatorError::Config(
                "buffer_trimming_sec must be > 0".to_string(),
            ));
        }
        if self.vac_chunk_size <= 0.0 {
            return Err(CoordinatorError::Config(
                "vac_chunk_size must be > 0".to_string(),
            ));
        }
        if !self.features.transcription && !self.features.diarization {
            return Err(CoordinatorError::Config(
                "at least one of transcription or diarization must be enabled".to_string(),
            ));
        }
        if self.llm.summary_interval_seconds <= 0.0 {
            return Err(CoordinatorError::Config(
                "llm.summary_interval_seconds must be > 0".to_string(),
            ));
        }
        if self.llm.new_text_trigger_chars == 0 {
            return Err(CoordinatorError::Config(
                "llm.new_text_trigger_chars must be > 0".to_string(),
            ));
        }
        if self.parser.trigger_interval_seconds <= 0.0 {
            return Err(CoordinatorError::Config(
                "parser.trigger_interval_seconds must be > 0".to_string(),
            ));
        }
        if self.parser.max_output_tokens == 0 || self.parser.max_output_tokens > 100_000 {
            return Err(CoordinatorError::Config(
                "parser.max_output_tokens must be in (0, 100000]".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn bytes_per_sec(&self) -> u32 {
        SAMPLE_RATE_HZ * BYTES_PER_SAMPLE
    }

    pub fn min_chunk_bytes(&self) -> usize {
        (self.bytes_per_sec() as f64 * self.min_chunk_size) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CoordinatorConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_no_transcription_no_diarization() {
        let mut cfg = CoordinatorConfig::default();
        cfg.features.transcription = false;
        cfg.features.diarization = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_min_chunk_size() {
        let mut cfg = CoordinatorConfig::default();
        cfg.min_chunk_size = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_max_output_tokens_out_of_range() {
        let mut cfg = CoordinatorConfig::default();
        cfg.parser.max_output_tokens = 200_000;
        assert!(cfg.validate().is_err());
    }
}
