//! Greedy RNN-T incremental decoder.
//!
//! Each encoder frame is decoded by alternating decoder-network and
//! joint-network steps and taking the argmax of the resulting logits:
//! blank stops the frame, EOU stops the frame without committing
//! state, and any other id commits the new RNN state and is emitted
//! before looping again on the same frame. Only the first
//! `valid_out_len` frames of a chunk are decoded; `(h, c,
//! last_token_id)` persist across chunks so decoding of chunk k
//! resumes exactly where chunk k-1 stopped.

use ndarray::{Array1, Array3, Axis};

use crate::config::{ArtifactConfig, DecoderRuntimeConfig};
use crate::error::Result;
use crate::models::{DecoderModel, JointModel};

/// Result of decoding the valid frames of one chunk.
pub struct DecodeStep {
    pub emitted_ids: Vec<u32>,
    pub eou_predicted: bool,
}

/// Persistent decoder state plus the two model collaborators. Carries
/// `(h, c, last_token_id)` across chunks so decoding of chunk k resumes
/// exactly where chunk k-1 stopped.
pub struct TransducerDecoder {
    decoder_model: Box<dyn DecoderModel>,
    joint_model: Box<dyn JointModel>,
    runtime: DecoderRuntimeConfig,
    blank_id: u32,
    eou_id: u32,
    start_token_id: u32,
    h: Array3<f32>,
    c: Array3<f32>,
    last_token_id: u32,
    accumulated_ids: Vec<u32>,
}

impl TransducerDecoder {
    pub fn new(
        decoder_model: Box<dyn DecoderModel>,
        joint_model: Box<dyn JointModel>,
        artifact: &ArtifactConfig,
        runtime: DecoderRuntimeConfig,
    ) -> Self {
        let h = Array3::zeros((runtime.decoder_num_layers, 1, runtime.decoder_hidden_dim));
        let c = h.clone();
        Self {
            decoder_model,
            joint_model,
            blank_id: artifact.blank_id(),
            eou_id: artifact.eou_id(),
            start_token_id: artifact.start_token_id,
            h,
            c,
            last_token_id: artifact.start_token_id,
            accumulated_ids: Vec::new(),
            runtime,
        }
    }

    pub fn accumulated_ids(&self) -> &[u32] {
        &self.accumulated_ids
    }

    /// Decodes the first `valid_out_len` frames of `encoded_output`
    /// (shape `[1, F, frames_out]`), appending to `accumulated_ids` and
    /// returning the ids emitted this call plus whether EOU was
    /// predicted on any frame.
    pub fn decode_chunk(&mut self, encoded_output: &Array3<f32>, valid_out_len: usize) -> Result<DecodeStep> {
        let mut emitted_ids = Vec::new();
        let mut eou_predicted = false;

        for t in 0..valid_out_len {
            let frame: Array1<f32> = encoded_output.index_axis(Axis(2), t).index_axis(Axis(0), 0).to_owned();

            for _ in 0..self.runtime.max_symbols_per_frame {
                let (decoder_out, new_h, new_c) =
                    self.decoder_model.step(self.last_token_id as i64, &self.h, &self.c)?;
                let logits = self.joint_model.step(&frame, &decoder_out)?;

                let argmax = argmax(&logits);

                if argmax == self.blank_id {
                    break;
                } else if argmax == self.eou_id {
                    eou_predicted = true;
                    break;
                } else {
                    emitted_ids.push(argmax);
                    self.accumulated_ids.push(argmax);
                    self.h = new_h;
                    self.c = new_c;
                    self.last_token_id = argmax;
                }
            }
        }

        Ok(DecodeStep { emitted_ids, eou_predicted })
    }

    /// Clears accumulated ids, e.g. after `finish()` hands them to the
    /// tokenizer collaborator.
    pub fn clear_accumulated(&mut self) {
        self.accumulated_ids.clear();
    }

    /// Restores zero RNN state and the start-of-stream token, as at
    /// session construction.
    pub fn reset(&mut self) {
        self.h.fill(0.0);
        self.c.fill(0.0);
        self.last_token_id = self.start_token_id;
        self.accumulated_ids.clear();
    }
}

fn argmax(logits: &Array1<f32>) -> u32 {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i as u32)
        .unwrap_or(0)
}
