//! Streaming automatic speech recognition engine.
//!
//! Implementation of a cache-aware streaming Conformer encoder paired
//! with an RNN-T (transducer) decoder and end-of-utterance debounce.
//!
//! # Module Structure
//!
//! - `config`: chunk profiles, artifact metadata, session configuration
//! - `buffer`: fixed-size overlapping chunk windows over pending PCM
//! - `mel`: mel spectrogram featurizer
//! - `caches`: the five persistent encoder cache tensors
//! - `models`: `EncoderModel`/`DecoderModel`/`JointModel` trait seams,
//!   `ort`-backed implementations (feature `onnx`), and null stubs
//! - `encoder`: streaming encoder driver (cache swap on success)
//! - `decoder`: greedy RNN-T incremental decoder
//! - `eou`: sample-accurate end-of-utterance debouncer
//! - `tokenizer`: id-sequence to text
//! - `session`: session orchestration tying the above together
//!
//! # Pipeline
//!
//! PCM samples accumulate in the chunk buffer; once a full chunk is
//! available it is mel-featurized, pushed through the streaming
//! encoder (which threads its cache tensors across calls), decoded
//! greedily against the first `valid_out_len` encoder frames, and the
//! decode result is folded into the EOU debouncer.

pub mod buffer;
pub mod caches;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod eou;
pub mod error;
pub mod mel;
pub mod models;
pub mod session;
pub mod tokenizer;

pub use config::{ArtifactConfig, ChunkProfile, DecoderRuntimeConfig, SessionConfig};
pub use error::{EngineError, Result};
pub use models::{DecoderModel, EncoderModel, JointModel};
pub use session::StreamingSession;
pub use tokenizer::{Tokenizer, VocabTokenizer};

#[cfg(feature = "onnx")]
pub use models::{OrtDecoderModel, OrtEncoderModel, OrtJointModel};
