//! Streaming encoder driver: owns the persistent cache state across
//! chunks and performs an all-or-nothing swap after each forward call.
//!
//! `self.caches = new_caches` only happens once the forward call has
//! returned `Ok`, so a failed chunk leaves the cache tensors exactly
//! as they were. The raw mel buffer is reshaped into the `[1, n_mels,
//! T]` tensor the model expects before each call.

use ndarray::Array3;

use crate::caches::EncoderCaches;
use crate::config::ChunkParams;
use crate::error::Result;
use crate::models::EncoderModel;

/// Wraps an [`EncoderModel`] with the cache state that must survive
/// across chunks within one session.
pub struct StreamingEncoderDriver {
    model: Box<dyn EncoderModel>,
    caches: EncoderCaches,
}

impl StreamingEncoderDriver {
    pub fn new(model: Box<dyn EncoderModel>, params: ChunkParams) -> Self {
        Self {
            model,
            caches: EncoderCaches::zeroed(params.pre_cache_frames),
        }
    }

    /// Runs one chunk through the encoder. `mel` is the flat `[n_mels, T]`
    /// row-major buffer produced by [`crate::mel::MelFeaturizer`].
    ///
    /// On success, the five cache tensors are swapped in as a unit; on
    /// failure the caches are left exactly as they were, so a caller
    /// that treats the failure as a dropped chunk (rather than a fatal
    /// session error) can keep streaming without corrupting state.
    pub fn process_chunk(&mut self, mel: &[f32], n_mels: usize, t: usize) -> Result<Array3<f32>> {
        let audio_signal = Array3::from_shape_fn((1, n_mels, t), |(_, m, frame)| mel[m * t + frame]);

        let (encoded, new_caches) = self.model.run(&audio_signal, t as i32, &self.caches)?;
        self.caches = new_caches;
        Ok(encoded)
    }

    pub fn caches(&self) -> &EncoderCaches {
        &self.caches
    }

    /// Resets all cache tensors to zero, as at session start.
    pub fn reset(&mut self, params: ChunkParams) {
        self.caches = EncoderCaches::zeroed(params.pre_cache_frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkProfile;
    use crate::models::NullEncoderModel;

    fn driver() -> StreamingEncoderDriver {
        let params = ChunkProfile::Short.params();
        StreamingEncoderDriver::new(Box::new(NullEncoderModel { encoder_output_dim: 512 }), params)
    }

    #[test]
    fn process_chunk_produces_expected_output_shape() {
        let mut driver = driver();
        let mel = vec![0.0f32; 128 * 17];
        let encoded = driver.process_chunk(&mel, 128, 17).unwrap();
        assert_eq!(encoded.shape(), &[1, 512, 17]);
    }

    #[test]
    fn reset_restores_zeroed_caches() {
        let mut driver = driver();
        let params = ChunkProfile::Short.params();
        let before = driver.caches().clone();
        driver.reset(params);
        assert!(driver.caches().shapes_match(&before));
    }
}
