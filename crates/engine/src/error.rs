use thiserror::Error;

/// Errors produced by the streaming ASR engine.
///
/// See the error handling design: `InvalidAudio` is non-recoverable for
/// the offending chunk (the caller is expected to `reset()`);
/// `InferenceFailed` leaves the session's caches and buffer untouched
/// so the caller may retry.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("session not initialized: {0}")]
    NotInitialized(String),

    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("tokenizer failed: {0}")]
    TokenizerFailed(String),

    #[error("session is busy")]
    Busy,

    /// Surfaced only by `dump_debug_features`, an ambient debugging aid.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for streamasr_core::Error {
    fn from(err: EngineError) -> Self {
        streamasr_core::Error::Engine(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
