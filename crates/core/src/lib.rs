//! Shared types for the streaming ASR engine.
//!
//! This crate holds the error and result types used across the engine
//! crate. It exists as a separate crate so that downstream integrations
//! can match on `streamasr_core::Error` without depending on the engine's
//! heavier dependency stack (ONNX Runtime, ndarray, etc.).

pub mod error;

pub use error::{Error, Result};
