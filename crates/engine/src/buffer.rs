//! Pending-PCM ring buffer with fixed chunk/shift arithmetic.

use std::collections::VecDeque;

use crate::error::{EngineError, Result};

/// Holds audio not yet consumed by the mel featurizer and yields
/// fixed-size, overlapping windows.
///
/// Backed by a `VecDeque` rather than `Vec` so `advance()` removes
/// from the front in O(shift_samples) instead of shifting the whole
/// buffer, the same reasoning applied to the decoder's frame history.
pub struct ChunkBuffer {
    samples: VecDeque<f32>,
    chunk_samples: usize,
    shift_samples: usize,
}

impl ChunkBuffer {
    pub fn new(chunk_samples: usize, shift_samples: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            chunk_samples,
            shift_samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends to the tail. Rejects NaN samples as `InvalidAudio`;
    /// values outside `[-1.0, 1.0]` are clipped silently per the
    /// ingress contract, not rejected.
    pub fn append(&mut self, samples: &[f32]) -> Result<()> {
        for &s in samples {
            if s.is_nan() {
                return Err(EngineError::InvalidAudio("NaN sample in input audio".into()));
            }
            self.samples.push_back(s.clamp(-1.0, 1.0));
        }
        Ok(())
    }

    /// If `len(buffer) >= chunk_samples`, returns a copy of the first
    /// `chunk_samples` samples without removing them. Otherwise `None`.
    pub fn drain_next(&self) -> Option<Vec<f32>> {
        if self.samples.len() < self.chunk_samples {
            return None;
        }
        Some(self.samples.iter().take(self.chunk_samples).copied().collect())
    }

    /// Removes the first `shift_samples` samples.
    pub fn advance(&mut self) {
        let n = self.shift_samples.min(self.samples.len());
        self.samples.drain(..n);
    }

    /// If non-empty, copies the buffer, right-pads with zeros to
    /// `chunk_samples`, and clears the buffer. Returns `None` when
    /// already empty, so `finish()` never produces more than one
    /// padded chunk.
    pub fn flush_padded(&mut self) -> Option<Vec<f32>> {
        if self.samples.is_empty() {
            return None;
        }
        let mut chunk: Vec<f32> = self.samples.drain(..).collect();
        chunk.resize(self.chunk_samples, 0.0);
        Some(chunk)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
