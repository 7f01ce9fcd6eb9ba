//! Trait seams around the three opaque tensor functions treated as
//! external collaborators (`streaming_encoder`, `decoder`, `joint`), an
//! `ort`-backed implementation of each behind the `onnx` feature, and
//! null stubs usable without any model artifacts at all.

use ndarray::{Array1, Array3};

use crate::caches::EncoderCaches;
use crate::error::Result;

/// Invokes the cache-aware streaming Conformer encoder.
pub trait EncoderModel: Send + Sync {
    /// `audio_signal` is `[1, 128, T]`, `audio_length = T`. Returns the
    /// encoded output `[1, F, frames_out]` and the five updated caches.
    fn run(
        &self,
        audio_signal: &Array3<f32>,
        audio_length: i32,
        caches: &EncoderCaches,
    ) -> Result<(Array3<f32>, EncoderCaches)>;
}

/// Invokes the transducer prediction network's single-step RNN.
pub trait DecoderModel: Send + Sync {
    /// Returns `(decoder_out, new_h, new_c)`.
    fn step(
        &self,
        last_token_id: i64,
        h: &Array3<f32>,
        c: &Array3<f32>,
    ) -> Result<(Array1<f32>, Array3<f32>, Array3<f32>)>;
}

/// Invokes the joint network combining one encoder frame with the
/// current decoder output.
pub trait JointModel: Send + Sync {
    /// Returns logits of length `V + 2` (vocab, blank, EOU).
    fn step(&self, encoder_frame: &Array1<f32>, decoder_out: &Array1<f32>) -> Result<Array1<f32>>;
}

/// Always predicts blank. Useful for exercising the chunk buffer,
/// mel featurizer, and EOU debouncer in isolation without loading any
/// model artifacts.
pub struct NullEncoderModel {
    pub encoder_output_dim: usize,
}

impl EncoderModel for NullEncoderModel {
    fn run(
        &self,
        audio_signal: &Array3<f32>,
        _audio_length: i32,
        caches: &EncoderCaches,
    ) -> Result<(Array3<f32>, EncoderCaches)> {
        let frames_out = audio_signal.shape()[2];
        let encoded = Array3::zeros((1, self.encoder_output_dim, frames_out));
        Ok((encoded, caches.clone()))
    }
}

pub struct NullDecoderModel {
    pub num_layers: usize,
    pub hidden_dim: usize,
}

impl DecoderModel for NullDecoderModel {
    fn step(
        &self,
        _last_token_id: i64,
        h: &Array3<f32>,
        c: &Array3<f32>,
    ) -> Result<(Array1<f32>, Array3<f32>, Array3<f32>)> {
        Ok((Array1::zeros(self.hidden_dim), h.clone(), c.clone()))
    }
}

/// Always argmaxes to `blank_id`, so a session wired to the null
/// models never emits tokens or EOU — a deterministic baseline for
/// testing everything upstream of the decode decision itself.
pub struct NullJointModel {
    pub logits_len: usize,
    pub blank_id: u32,
}

impl JointModel for NullJointModel {
    fn step(&self, _encoder_frame: &Array1<f32>, _decoder_out: &Array1<f32>) -> Result<Array1<f32>> {
        let mut logits = Array1::zeros(self.logits_len);
        logits[self.blank_id as usize] = 1.0;
        Ok(logits)
    }
}

#[cfg(feature = "onnx")]
pub use onnx_backend::{OrtDecoderModel, OrtEncoderModel, OrtJointModel};

#[cfg(feature = "onnx")]
mod onnx_backend {
    use super::*;
    use crate::error::EngineError;
    use ndarray::Ix3;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::{Session, SessionOutputs};
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use std::path::Path;

    fn load_session(path: &Path) -> Result<Session> {
        Session::builder()
            .map_err(|e| EngineError::InferenceFailed(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EngineError::InferenceFailed(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| EngineError::InferenceFailed(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| EngineError::InferenceFailed(format!("failed to load {}: {e}", path.display())))
    }

    fn extract_array3(outputs: &SessionOutputs, name: &str) -> Result<Array3<f32>> {
        outputs
            .get(name)
            .ok_or_else(|| EngineError::InferenceFailed(format!("missing '{name}' output")))?
            .try_extract_array::<f32>()
            .map_err(|e| EngineError::InferenceFailed(e.to_string()))?
            .to_owned()
            .into_dimensionality::<Ix3>()
            .map_err(|e| EngineError::InferenceFailed(format!("bad '{name}' shape: {e}")))
    }

    fn extract_array1(outputs: &SessionOutputs, name: &str) -> Result<Array1<f32>> {
        let view = outputs
            .get(name)
            .ok_or_else(|| EngineError::InferenceFailed(format!("missing '{name}' output")))?
            .try_extract_array::<f32>()
            .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
        let flat: Vec<f32> = view.iter().copied().collect();
        Ok(Array1::from_vec(flat))
    }

    /// Cache-aware streaming Conformer encoder, loaded from
    /// `<model_dir>/streaming_encoder`.
    pub struct OrtEncoderModel {
        session: Mutex<Session>,
    }

    impl OrtEncoderModel {
        pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
            Ok(Self {
                session: Mutex::new(load_session(&model_dir.as_ref().join("streaming_encoder"))?),
            })
        }
    }

    impl EncoderModel for OrtEncoderModel {
        fn run(
            &self,
            audio_signal: &Array3<f32>,
            audio_length: i32,
            caches: &EncoderCaches,
        ) -> Result<(Array3<f32>, EncoderCaches)> {
            let audio_tensor =
                Tensor::from_array(audio_signal.clone()).map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let length_tensor = Tensor::from_array(Array1::from_vec(vec![audio_length]))
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let pre_cache_tensor =
                Tensor::from_array(caches.pre_cache.clone()).map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let channel_tensor = Tensor::from_array(caches.cache_last_channel.clone())
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let time_tensor = Tensor::from_array(caches.cache_last_time.clone())
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let channel_len_tensor = Tensor::from_array(caches.cache_last_channel_len.clone())
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![
                    "audio_signal" => audio_tensor,
                    "audio_length" => length_tensor,
                    "pre_cache" => pre_cache_tensor,
                    "cache_last_channel" => channel_tensor,
                    "cache_last_time" => time_tensor,
                    "cache_last_channel_len" => channel_len_tensor,
                ])
                .map_err(|e| EngineError::InferenceFailed(format!("encoder failed: {e}")))?;

            let encoded = extract_array3(&outputs, "encoded_output")?;
            let new_pre_cache = extract_array3(&outputs, "new_pre_cache")?;
            let new_cache_last_channel = outputs
                .get("new_cache_last_channel")
                .ok_or_else(|| EngineError::InferenceFailed("missing 'new_cache_last_channel' output".into()))?
                .try_extract_array::<f32>()
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?
                .to_owned()
                .into_dimensionality::<ndarray::Ix4>()
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let new_cache_last_time = outputs
                .get("new_cache_last_time")
                .ok_or_else(|| EngineError::InferenceFailed("missing 'new_cache_last_time' output".into()))?
                .try_extract_array::<f32>()
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?
                .to_owned()
                .into_dimensionality::<ndarray::Ix4>()
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let new_cache_last_channel_len = outputs
                .get("new_cache_last_channel_len")
                .ok_or_else(|| EngineError::InferenceFailed("missing 'new_cache_last_channel_len' output".into()))?
                .try_extract_array::<i32>()
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?
                .to_owned()
                .into_dimensionality::<ndarray::Ix1>()
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;

            Ok((
                encoded,
                EncoderCaches {
                    pre_cache: new_pre_cache,
                    cache_last_channel: new_cache_last_channel,
                    cache_last_time: new_cache_last_time,
                    cache_last_channel_len: new_cache_last_channel_len,
                },
            ))
        }
    }

    /// Transducer prediction-network RNN, loaded from `<model_dir>/decoder`.
    pub struct OrtDecoderModel {
        session: Mutex<Session>,
    }

    impl OrtDecoderModel {
        pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
            Ok(Self {
                session: Mutex::new(load_session(&model_dir.as_ref().join("decoder"))?),
            })
        }
    }

    impl DecoderModel for OrtDecoderModel {
        fn step(
            &self,
            last_token_id: i64,
            h: &Array3<f32>,
            c: &Array3<f32>,
        ) -> Result<(Array1<f32>, Array3<f32>, Array3<f32>)> {
            let token_tensor = Tensor::from_array(Array1::from_vec(vec![last_token_id]))
                .map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let h_tensor = Tensor::from_array(h.clone()).map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let c_tensor = Tensor::from_array(c.clone()).map_err(|e| EngineError::InferenceFailed(e.to_string()))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![
                    "last_token_id" => token_tensor,
                    "h_in" => h_tensor,
                    "c_in" => c_tensor,
                ])
                .map_err(|e| EngineError::InferenceFailed(format!("decoder failed: {e}")))?;

            let decoder_out = extract_array1(&outputs, "decoder_output")?;
            let new_h = extract_array3(&outputs, "h_out")?;
            let new_c = extract_array3(&outputs, "c_out")?;
            Ok((decoder_out, new_h, new_c))
        }
    }

    /// Joint network, loaded from `<model_dir>/joint_decision`.
    pub struct OrtJointModel {
        session: Mutex<Session>,
    }

    impl OrtJointModel {
        pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
            Ok(Self {
                session: Mutex::new(load_session(&model_dir.as_ref().join("joint_decision"))?),
            })
        }
    }

    impl JointModel for OrtJointModel {
        fn step(&self, encoder_frame: &Array1<f32>, decoder_out: &Array1<f32>) -> Result<Array1<f32>> {
            let encoder_tensor =
                Tensor::from_array(encoder_frame.clone()).map_err(|e| EngineError::InferenceFailed(e.to_string()))?;
            let decoder_tensor =
                Tensor::from_array(decoder_out.clone()).map_err(|e| EngineError::InferenceFailed(e.to_string()))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![
                    "encoder_frame" => encoder_tensor,
                    "decoder_output" => decoder_tensor,
                ])
                .map_err(|e| EngineError::InferenceFailed(format!("joint failed: {e}")))?;

            extract_array1(&outputs, "logits")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_joint_always_predicts_blank() {
        let joint = NullJointModel { logits_len: 10, blank_id: 8 };
        let logits = joint.step(&Array1::zeros(4), &Array1::zeros(4)).unwrap();
        let argmax = logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(argmax, 8);
    }

    #[test]
    fn null_encoder_preserves_cache_shapes() {
        let encoder = NullEncoderModel { encoder_output_dim: 512 };
        let caches = EncoderCaches::zeroed(9);
        let audio = Array3::zeros((1, 128, 64));
        let (encoded, new_caches) = encoder.run(&audio, 64, &caches).unwrap();
        assert_eq!(encoded.shape(), &[1, 512, 64]);
        assert!(new_caches.shapes_match(&caches));
    }
}
