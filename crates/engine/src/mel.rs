//! Mel spectrogram featurizer.
//!
//! Converts a fixed-size PCM chunk into a `[n_mels, T]` log-mel matrix
//! matching a fixed reference recipe: FFT/window/filterbank machinery
//! is grounded on `MelFilterbank` (realfft, periodic Hann window,
//! center/reflect padding), but the filter scale here is slaney (not
//! HTK-like), the log guard is `1e-5` (not `1e-9`), and per-utterance
//! mean/std normalization and pre-emphasis are both dropped: no
//! normalization is applied beyond the log compression itself.

use realfft::RealFftPlanner;
use std::sync::Arc;

use crate::error::{EngineError, Result};

const SAMPLE_RATE: f32 = 16_000.0;
const N_FFT: usize = 512;
const HOP_LENGTH: usize = 160;
const WIN_LENGTH: usize = 400;
const N_MELS: usize = 128;
const FMIN: f32 = 0.0;
const FMAX: f32 = 8_000.0;
const LOG_GUARD: f32 = 1e-5;

/// Number of output mel frames for a chunk of `chunk_samples` PCM
/// samples, per the fixed framing recipe.
pub fn frame_count(chunk_samples: usize) -> usize {
    (chunk_samples + 2 * (N_FFT / 2) - WIN_LENGTH) / HOP_LENGTH + 1
}

pub struct MelFeaturizer {
    chunk_samples: usize,
    window: Vec<f32>,
    filterbank: Vec<f32>, // [N_MELS][N_FFT/2 + 1], row-major
    fft: Arc<dyn realfft::RealToComplex<f32>>,
}

impl MelFeaturizer {
    pub fn new(chunk_samples: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(N_FFT);
        Self {
            chunk_samples,
            window: periodic_hann(WIN_LENGTH),
            filterbank: slaney_filterbank(),
            fft,
        }
    }

    /// Converts `chunk` (must be exactly `chunk_samples` long) into a
    /// flat `[n_mels, T]` row-major log-mel buffer, returning the
    /// buffer and `T`.
    pub fn extract(&self, chunk: &[f32]) -> Result<(Vec<f32>, usize)> {
        if chunk.len() != self.chunk_samples {
            return Err(EngineError::InvalidAudio(format!(
                "expected chunk of {} samples, got {}",
                self.chunk_samples,
                chunk.len()
            )));
        }

        let padded = reflect_pad(chunk, N_FFT / 2);
        let t = frame_count(self.chunk_samples);

        let mut mel = vec![0.0f32; N_MELS * t];
        let mut fft_input = self.fft.make_input_vec();
        let mut fft_output = self.fft.make_output_vec();
        let half_pad = (N_FFT - WIN_LENGTH) / 2;

        for frame_idx in 0..t {
            let start = frame_idx * HOP_LENGTH;
            fft_input.iter_mut().for_each(|v| *v = 0.0);
            for i in 0..WIN_LENGTH {
                fft_input[half_pad + i] = padded[start + i] * self.window[i];
            }

            self.fft
                .process(&mut fft_input, &mut fft_output)
                .map_err(|e| EngineError::InvalidAudio(format!("fft failed: {e}")))?;

            // power spectrum, |X|^2, over N_FFT/2 + 1 bins.
            let mut power = [0.0f32; N_FFT / 2 + 1];
            for (k, bin) in fft_output.iter().enumerate() {
                power[k] = bin.norm_sqr();
            }

            for m in 0..N_MELS {
                let row = &self.filterbank[m * (N_FFT / 2 + 1)..(m + 1) * (N_FFT / 2 + 1)];
                let energy: f32 = row.iter().zip(power.iter()).map(|(w, p)| w * p).sum();
                let mut log_mel = (energy + LOG_GUARD).ln();
                if !log_mel.is_finite() {
                    log_mel = LOG_GUARD.ln();
                }
                mel[m * t + frame_idx] = log_mel;
            }
        }

        Ok((mel, t))
    }
}

fn periodic_hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / len as f32).cos())
        .collect()
}

fn reflect_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    let n = signal.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    for i in 0..pad {
        out.push(signal[pad - i]);
    }
    out.extend_from_slice(signal);
    for i in 0..pad {
        out.push(signal[n - 2 - i]);
    }
    out
}

fn hz_to_mel(f: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0f32;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;
    if f < min_log_hz {
        f / f_sp
    } else {
        min_log_mel + (f / min_log_hz).ln() / logstep
    }
}

fn mel_to_hz(m: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0f32;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;
    if m < min_log_mel {
        f_sp * m
    } else {
        min_log_hz * (logstep * (m - min_log_mel)).exp()
    }
}

/// Slaney-scale, area-normalized triangular mel filterbank, flattened
/// row-major as `[N_MELS][N_FFT/2 + 1]`.
fn slaney_filterbank() -> Vec<f32> {
    let n_bins = N_FFT / 2 + 1;
    let fft_freqs: Vec<f32> = (0..n_bins).map(|k| k as f32 * SAMPLE_RATE / N_FFT as f32).collect();

    let mel_min = hz_to_mel(FMIN);
    let mel_max = hz_to_mel(FMAX);
    let hz_points: Vec<f32> = (0..N_MELS + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (N_MELS + 1) as f32))
        .collect();

    let mut filters = vec![0.0f32; N_MELS * n_bins];
    for m in 0..N_MELS {
        let (f_left, f_center, f_right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        let enorm = 2.0 / (f_right - f_left);
        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - f_left) / (f_center - f_left);
            let upper = (f_right - freq) / (f_right - f_center);
            let weight = lower.min(upper).max(0.0);
            filters[m * n_bins + k] = weight * enorm;
        }
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_counts_match_fixed_chunk_profiles() {
        assert_eq!(frame_count(2560), 17);
        assert_eq!(frame_count(10080), 64);
        assert_eq!(frame_count(50928), 320);
    }

    #[test]
    fn rejects_wrong_length_chunk() {
        let mel = MelFeaturizer::new(2560);
        let err = mel.extract(&vec![0.0; 100]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAudio(_)));
    }

    #[test]
    fn silence_produces_finite_log_floor() {
        let mel = MelFeaturizer::new(2560);
        let (buf, t) = mel.extract(&vec![0.0; 2560]).unwrap();
        assert_eq!(t, 17);
        assert_eq!(buf.len(), N_MELS * t);
        for v in buf {
            assert!(v.is_finite());
            assert!((v - LOG_GUARD.ln()).abs() < 1e-3);
        }
    }

    #[test]
    fn tone_produces_finite_nonuniform_output() {
        let mel = MelFeaturizer::new(2560);
        let samples: Vec<f32> = (0..2560)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE).sin())
            .collect();
        let (buf, _t) = mel.extract(&samples).unwrap();
        assert!(buf.iter().all(|v| v.is_finite()));
        assert!(buf.iter().any(|&v| (v - LOG_GUARD.ln()).abs() > 1e-3));
    }

    #[test]
    fn filterbank_rows_are_nonnegative_and_normalized() {
        let fb = slaney_filterbank();
        assert!(fb.iter().all(|&w| w >= 0.0));
    }
}
