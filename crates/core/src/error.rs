use thiserror::Error;

/// Top-level error type shared across crates built on top of the engine.
///
/// Individual crates define their own richer error enums (see
/// `streamasr_engine::EngineError`) and convert into this one at their
/// public boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("engine error: {0}")]
    Engine(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
