//! The five encoder cache tensors, grouped into one record so an
//! all-or-nothing swap across a chunk boundary is enforced by
//! construction rather than by convention: a single struct assignment
//! replaces every tensor together, never one at a time.

use ndarray::{Array1, Array3, Array4};

/// Per-layer channel/time caches plus the mel-level pre-cache lookahead.
/// Shapes are fixed and never change across a session.
#[derive(Debug, Clone)]
pub struct EncoderCaches {
    /// `[1, 128, pre_cache_frames]`
    pub pre_cache: Array3<f32>,
    /// `[17, 1, 70, 512]`
    pub cache_last_channel: Array4<f32>,
    /// `[17, 1, 512, 8]`
    pub cache_last_time: Array4<f32>,
    /// `[1]`
    pub cache_last_channel_len: Array1<i32>,
}

const NUM_LAYERS: usize = 17;
const CHANNEL_CONTEXT: usize = 70;
const CHANNEL_DIM: usize = 512;
const TIME_CONTEXT: usize = 8;

impl EncoderCaches {
    pub fn zeroed(pre_cache_frames: usize) -> Self {
        Self {
            pre_cache: Array3::zeros((1, 128, pre_cache_frames)),
            cache_last_channel: Array4::zeros((NUM_LAYERS, 1, CHANNEL_CONTEXT, CHANNEL_DIM)),
            cache_last_time: Array4::zeros((NUM_LAYERS, 1, CHANNEL_DIM, TIME_CONTEXT)),
            cache_last_channel_len: Array1::zeros(1),
        }
    }

    pub fn shapes_match(&self, other: &EncoderCaches) -> bool {
        self.pre_cache.shape() == other.pre_cache.shape()
            && self.cache_last_channel.shape() == other.cache_last_channel.shape()
            && self.cache_last_time.shape() == other.cache_last_time.shape()
            && self.cache_last_channel_len.shape() == other.cache_last_channel_len.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_shapes_match_fixed_layout() {
        let caches = EncoderCaches::zeroed(9);
        assert_eq!(caches.pre_cache.shape(), &[1, 128, 9]);
        assert_eq!(caches.cache_last_channel.shape(), &[17, 1, 70, 512]);
        assert_eq!(caches.cache_last_time.shape(), &[17, 1, 512, 8]);
        assert_eq!(caches.cache_last_channel_len.shape(), &[1]);
    }

    #[test]
    fn shapes_match_is_profile_invariant_for_fixed_pre_cache_frames() {
        let a = EncoderCaches::zeroed(9);
        let b = EncoderCaches::zeroed(9);
        assert!(a.shapes_match(&b));
    }
}
