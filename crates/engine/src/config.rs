//! Session and artifact configuration.
//!
//! Plain builder-pattern configuration structs: a `Default` impl plus
//! `with_*` fluent setters, not a generic `config`-crate/TOML layer.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};

/// Fixed chunk/shift/cache parameters for one of the three supported
/// streaming granularities. Selected once at session construction and
/// immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkProfile {
    Short,
    Medium,
    Long,
}

/// Resolved numeric parameters for a [`ChunkProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_samples: usize,
    pub mel_frames: usize,
    pub valid_out_len: usize,
    pub pre_cache_frames: usize,
    pub shift_samples: usize,
    pub latency_ms: u32,
}

impl ChunkProfile {
    pub fn params(self) -> ChunkParams {
        match self {
            ChunkProfile::Short => ChunkParams {
                chunk_samples: 2560,
                mel_frames: 17,
                valid_out_len: 2,
                pre_cache_frames: 16,
                shift_samples: 1280,
                latency_ms: 160,
            },
            ChunkProfile::Medium => ChunkParams {
                chunk_samples: 10080,
                mel_frames: 64,
                valid_out_len: 4,
                pre_cache_frames: 9,
                shift_samples: 5120,
                latency_ms: 320,
            },
            ChunkProfile::Long => ChunkParams {
                // Not derivable from (mel_frames - 1) * hop_length; kept
                // as a calibration constant tied to the trained
                // artifact's n_fft.
                chunk_samples: 50928,
                mel_frames: 320,
                valid_out_len: 20,
                pre_cache_frames: 9,
                shift_samples: 25600,
                latency_ms: 1600,
            },
        }
    }
}

impl Default for ChunkProfile {
    fn default() -> Self {
        ChunkProfile::Short
    }
}

/// Constants that belong to the trained artifact, not to engine logic:
/// loaded once from `artifact_config.json` alongside the model files
/// rather than hardcoded, since the start-of-stream token and blank
/// index vary per trained model and must not be guessed at runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactConfig {
    pub vocab_size: usize,
    #[serde(default)]
    pub blank_id: Option<u32>,
    #[serde(default)]
    pub eou_id: Option<u32>,
    pub start_token_id: u32,
}

impl ArtifactConfig {
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
        let path = model_dir.as_ref().join("artifact_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| EngineError::NotInitialized(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| EngineError::NotInitialized(format!("failed to parse artifact config: {e}")))
    }

    /// Blank index, pinned from artifact metadata when present,
    /// defaulting to `vocab_size` (index `V`) when the artifact does
    /// not declare one explicitly.
    pub fn blank_id(&self) -> u32 {
        self.blank_id.unwrap_or(self.vocab_size as u32)
    }

    /// EOU class index, defaulting to `V + 1` under a single
    /// concatenated logit vector layout.
    pub fn eou_id(&self) -> u32 {
        self.eou_id.unwrap_or(self.vocab_size as u32 + 1)
    }
}

/// Runtime knobs for the greedy transducer decode loop and the fixed
/// decoder RNN state shape.
#[derive(Debug, Clone, Copy)]
pub struct DecoderRuntimeConfig {
    pub max_symbols_per_frame: usize,
    pub decoder_num_layers: usize,
    pub decoder_hidden_dim: usize,
}

impl Default for DecoderRuntimeConfig {
    fn default() -> Self {
        Self {
            max_symbols_per_frame: 10,
            decoder_num_layers: 2,
            decoder_hidden_dim: 640,
        }
    }
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub chunk_profile: ChunkProfile,
    pub eou_debounce_ms: u32,
    pub debug_features: bool,
    pub decoder: DecoderRuntimeConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_profile: ChunkProfile::default(),
            eou_debounce_ms: 1280,
            debug_features: false,
            decoder: DecoderRuntimeConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_chunk_profile(mut self, profile: ChunkProfile) -> Self {
        self.chunk_profile = profile;
        self
    }

    pub fn with_eou_debounce_ms(mut self, debounce_ms: u32) -> Self {
        self.eou_debounce_ms = debounce_ms;
        self
    }

    pub fn with_debug_features(mut self, enabled: bool) -> Self {
        self.debug_features = enabled;
        self
    }

    pub fn with_decoder(mut self, decoder: DecoderRuntimeConfig) -> Self {
        self.decoder = decoder;
        self
    }
}
