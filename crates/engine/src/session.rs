//! Session orchestration: argument validation, callback dispatch, and
//! lifecycle, tying the buffer, encoder, decoder, and debouncer
//! together.
//!
//! All mutable state lives behind one `parking_lot::Mutex`. An
//! `AtomicBool` guard around it rejects concurrent calls immediately
//! with `Busy` rather than blocking or queuing them, since a second
//! caller interleaving with an in-flight `process()` would observe a
//! half-updated encoder/decoder state.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::caches::EncoderCaches;
use crate::config::{ArtifactConfig, ChunkParams, SessionConfig};
use crate::decoder::TransducerDecoder;
use crate::encoder::StreamingEncoderDriver;
use crate::eou::EouDebouncer;
use crate::error::{EngineError, Result};
use crate::mel::MelFeaturizer;
use crate::models::{DecoderModel, EncoderModel, JointModel};
use crate::tokenizer::Tokenizer;
use crate::buffer::ChunkBuffer;

/// A debug-mode snapshot of one chunk's mel output, recorded only when
/// [`SessionConfig::debug_features`] is set.
struct DebugFrame {
    mel: Vec<f32>,
    n_mels: usize,
    t: usize,
}

struct SessionState {
    buffer: ChunkBuffer,
    encoder: StreamingEncoderDriver,
    decoder: TransducerDecoder,
    debouncer: EouDebouncer,
    processed_chunks: u64,
    debug_log: Vec<DebugFrame>,
}

/// One long-lived streaming session: `append_audio`/`process`,
/// `finish`, `reset`, `inject_silence`.
///
/// A single-writer cooperative actor: concurrent calls are rejected
/// with [`EngineError::Busy`] rather than interleaved or queued.
pub struct StreamingSession {
    config: SessionConfig,
    params: ChunkParams,
    mel: MelFeaturizer,
    tokenizer: Box<dyn Tokenizer>,
    partial_callback: Option<Box<dyn Fn(&str) + Send + Sync>>,
    eou_callback: Option<Box<dyn Fn(&str) + Send + Sync>>,
    busy: AtomicBool,
    state: Mutex<SessionState>,
}

/// Releases the busy flag on drop, including on early return via `?`.
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Result<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::Busy)?;
        Ok(Self { busy })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl StreamingSession {
    pub fn new(
        config: SessionConfig,
        artifact: &ArtifactConfig,
        encoder_model: Box<dyn EncoderModel>,
        decoder_model: Box<dyn DecoderModel>,
        joint_model: Box<dyn JointModel>,
        tokenizer: Box<dyn Tokenizer>,
        partial_callback: Option<Box<dyn Fn(&str) + Send + Sync>>,
        eou_callback: Option<Box<dyn Fn(&str) + Send + Sync>>,
    ) -> Self {
        let params = config.chunk_profile.params();
        tracing::info!(
            chunk_samples = params.chunk_samples,
            eou_debounce_ms = config.eou_debounce_ms,
            debug_features = config.debug_features,
            "streaming session constructed"
        );
        let state = SessionState {
            buffer: ChunkBuffer::new(params.chunk_samples, params.shift_samples),
            encoder: StreamingEncoderDriver::new(encoder_model, params),
            decoder: TransducerDecoder::new(decoder_model, joint_model, artifact, config.decoder),
            debouncer: EouDebouncer::new(config.eou_debounce_ms),
            processed_chunks: 0,
            debug_log: Vec::new(),
        };

        Self {
            config,
            params,
            mel: MelFeaturizer::new(params.chunk_samples),
            tokenizer,
            partial_callback,
            eou_callback,
            busy: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }

    /// Appends audio and drives the streaming pipeline for every full
    /// chunk now available. Always returns the empty string: transcripts
    /// are delivered exclusively via callbacks and `finish()`.
    pub fn process(&self, samples: &[f32]) -> Result<String> {
        let _guard = match BusyGuard::acquire(&self.busy) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!("process() rejected: session busy");
                return Err(e);
            }
        };
        if samples.is_empty() {
            return Ok(String::new());
        }

        tracing::trace!(samples = samples.len(), "process: appending audio");
        let mut state = self.state.lock();
        state.buffer.append(samples)?;

        while let Some(chunk) = state.buffer.drain_next() {
            self.process_one_chunk(&mut state, chunk)?;
        }

        Ok(String::new())
    }

    /// `append_audio` is an alias for `process` that discards the
    /// (always-empty) return value, for callers that only care about
    /// the callback-delivered output.
    pub fn append_audio(&self, samples: &[f32]) -> Result<()> {
        self.process(samples).map(|_| ())
    }

    fn process_one_chunk(&self, state: &mut SessionState, chunk: Vec<f32>) -> Result<()> {
        let (mel, t) = self.mel.extract(&chunk)?;

        if self.config.debug_features {
            state.debug_log.push(DebugFrame { mel: mel.clone(), n_mels: 128, t });
        }

        let encoded = match state.encoder.process_chunk(&mel, 128, t) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(chunk = state.processed_chunks, error = %e, "encoder inference failed, caches unchanged");
                return Err(e);
            }
        };
        let step = state.decoder.decode_chunk(&encoded, self.params.valid_out_len)?;

        state.processed_chunks += 1;
        state.buffer.advance();

        let emitted_any = !step.emitted_ids.is_empty();
        if emitted_any {
            if let Some(cb) = &self.partial_callback {
                let text = self.tokenizer.decode(state.decoder.accumulated_ids())?;
                tracing::debug!(chunk = state.processed_chunks, len = text.len(), "partial transcript");
                cb(&text);
            }
        }

        let update = state.debouncer.update(self.params.shift_samples as u64, step.eou_predicted, emitted_any);
        if update.just_confirmed {
            tracing::info!(chunk = state.processed_chunks, "end-of-utterance confirmed");
            if let Some(cb) = &self.eou_callback {
                let text = self.tokenizer.decode(state.decoder.accumulated_ids())?;
                cb(&text);
            }
        }

        Ok(())
    }

    /// Flushes any pending partial chunk, decodes the accumulated ids
    /// to text, clears them, and returns the final transcript. Does
    /// not touch model caches or reset the encoder/decoder state.
    pub fn finish(&self) -> Result<String> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let mut state = self.state.lock();

        if let Some(chunk) = state.buffer.flush_padded() {
            self.process_one_chunk(&mut state, chunk)?;
        }

        let text = self.tokenizer.decode(state.decoder.accumulated_ids())?;
        tracing::debug!(chunk = state.processed_chunks, len = text.len(), "finish: final transcript");
        state.decoder.clear_accumulated();
        Ok(text)
    }

    /// Clears all mutable state and re-zeroes every tensor, as at
    /// session construction.
    pub fn reset(&self) -> Result<()> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let mut state = self.state.lock();

        state.buffer.clear();
        state.encoder.reset(self.params);
        state.decoder.reset();
        state.debouncer.reset();
        state.processed_chunks = 0;
        state.debug_log.clear();
        tracing::info!("session reset");
        Ok(())
    }

    /// Appends `round(seconds * 16000)` zero samples, forcing the EOU
    /// debounce timer forward without real audio.
    pub fn inject_silence(&self, seconds: f64) -> Result<String> {
        let n = (seconds * 16_000.0).round() as usize;
        self.process(&vec![0.0; n])
    }

    /// Writes every recorded mel frame (only populated when
    /// `debug_features` is enabled) to `path` as JSON.
    pub fn dump_debug_features(&self, path: impl AsRef<Path>) -> Result<()> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let state = self.state.lock();

        let dump: Vec<serde_json::Value> = state
            .debug_log
            .iter()
            .map(|f| serde_json::json!({ "n_mels": f.n_mels, "t": f.t, "mel": f.mel }))
            .collect();

        let content = serde_json::to_string(&dump)
            .map_err(|e| EngineError::InferenceFailed(format!("failed to serialize debug features: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn processed_chunks(&self) -> u64 {
        self.state.lock().processed_chunks
    }

    pub fn total_samples_processed(&self) -> u64 {
        self.state.lock().debouncer.total_samples_processed()
    }

    pub fn eou_confirmed(&self) -> bool {
        self.state.lock().debouncer.eou_confirmed()
    }

    pub fn accumulated_id_count(&self) -> usize {
        self.state.lock().decoder.accumulated_ids().len()
    }

    pub fn encoder_caches(&self) -> EncoderCaches {
        self.state.lock().encoder.caches().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkProfile;
    use crate::models::{JointModel, NullDecoderModel, NullEncoderModel, NullJointModel};
    use crate::tokenizer::VocabTokenizer;
    use ndarray::Array1;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn artifact() -> ArtifactConfig {
        ArtifactConfig { vocab_size: 4, blank_id: None, eou_id: None, start_token_id: 4 }
    }

    fn null_session(config: SessionConfig) -> StreamingSession {
        let decoder_hidden = config.decoder.decoder_hidden_dim;
        StreamingSession::new(
            config,
            &artifact(),
            Box::new(NullEncoderModel { encoder_output_dim: 8 }),
            Box::new(NullDecoderModel { num_layers: 2, hidden_dim: decoder_hidden }),
            Box::new(NullJointModel { logits_len: 6, blank_id: 4 }),
            Box::new(VocabTokenizer::from_tokens(vec!["a".into(), "b".into(), "c".into(), "d".into()])),
            None,
            None,
        )
    }

    #[test]
    fn silence_only_confirms_eou_and_finishes_empty() {
        let session = null_session(SessionConfig::default().with_chunk_profile(ChunkProfile::Short));
        let samples = vec![0.0f32; 32_000]; // 2.0s @ 16kHz
        session.process(&samples).unwrap();
        assert!(session.eou_confirmed());
        let text = session.finish().unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn process_on_empty_slice_is_a_no_op() {
        let session = null_session(SessionConfig::default());
        let before = session.processed_chunks();
        session.process(&[]).unwrap();
        assert_eq!(session.processed_chunks(), before);
    }

    #[test]
    fn finish_on_empty_session_returns_empty_string() {
        let session = null_session(SessionConfig::default());
        assert_eq!(session.finish().unwrap(), "");
    }

    #[test]
    fn total_samples_processed_tracks_shift_times_chunks() {
        let session = null_session(SessionConfig::default().with_chunk_profile(ChunkProfile::Short));
        // chunk_samples=2560, shift_samples=1280: 32000 samples only
        // advance 24 full windows (floor((32000-2560)/1280)+1); the
        // trailing 1280 samples need finish() to flush as a padded chunk.
        let samples = vec![0.0f32; 1280 * 25];
        session.process(&samples).unwrap();
        session.finish().unwrap();
        assert_eq!(session.total_samples_processed(), 25 * 1280);
    }

    #[test]
    fn reset_zeroes_counters_and_clears_accumulated_ids() {
        let session = null_session(SessionConfig::default().with_chunk_profile(ChunkProfile::Short));
        session.process(&vec![0.0f32; 1280 * 5]).unwrap();
        session.reset().unwrap();
        assert_eq!(session.processed_chunks(), 0);
        assert_eq!(session.total_samples_processed(), 0);
        assert!(!session.eou_confirmed());
        assert_eq!(session.accumulated_id_count(), 0);
    }

    #[test]
    fn concurrent_calls_are_rejected_as_busy() {
        let session = null_session(SessionConfig::default());
        let _guard = BusyGuard::acquire(&session.busy).unwrap();
        let err = session.process(&[0.0]).unwrap_err();
        assert!(matches!(err, EngineError::Busy));
    }

    #[test]
    fn partial_callback_fires_only_when_tokens_were_emitted() {
        // the null joint never emits tokens, so the callback must
        // never fire across a full session.
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();
        let mut session = null_session(SessionConfig::default().with_chunk_profile(ChunkProfile::Short));
        session.partial_callback = Some(Box::new(move |_text| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        session.process(&vec![0.0f32; 1280 * 5]).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inject_silence_advances_the_debounce_timer() {
        let session = null_session(
            SessionConfig::default()
                .with_chunk_profile(ChunkProfile::Short)
                .with_eou_debounce_ms(1280),
        );
        session.inject_silence(2.0).unwrap();
        assert!(session.eou_confirmed());
    }

    #[test]
    fn dump_debug_features_writes_json_when_enabled() {
        let session = null_session(
            SessionConfig::default()
                .with_chunk_profile(ChunkProfile::Short)
                .with_debug_features(true),
        );
        session.process(&vec![0.0f32; 1280 * 2]).unwrap();
        let path = std::env::temp_dir().join(format!("streamasr-debug-{}.json", std::process::id()));
        session.dump_debug_features(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with('['));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn encoder_caches_shape_invariant_across_chunks() {
        let session = null_session(SessionConfig::default().with_chunk_profile(ChunkProfile::Short));
        let before = session.encoder_caches();
        session.process(&vec![0.1f32; 1280 * 3]).unwrap();
        let after = session.encoder_caches();
        assert!(before.shapes_match(&after));
    }

    /// Cycles through a fixed sequence of argmax decisions, independent
    /// of its inputs, so the resulting token stream depends only on how
    /// many times the joint network was invoked and in what order.
    struct ScriptedJoint {
        script: Vec<u32>,
        logits_len: usize,
        call: AtomicUsize,
    }

    impl JointModel for ScriptedJoint {
        fn step(&self, _encoder_frame: &Array1<f32>, _decoder_out: &Array1<f32>) -> crate::error::Result<Array1<f32>> {
            let idx = self.call.fetch_add(1, Ordering::SeqCst) % self.script.len();
            let mut logits = Array1::zeros(self.logits_len);
            logits[self.script[idx] as usize] = 1.0;
            Ok(logits)
        }
    }

    fn scripted_session(config: SessionConfig, script: Vec<u32>) -> StreamingSession {
        let decoder_hidden = config.decoder.decoder_hidden_dim;
        StreamingSession::new(
            config,
            &artifact(),
            Box::new(NullEncoderModel { encoder_output_dim: 8 }),
            Box::new(NullDecoderModel { num_layers: 2, hidden_dim: decoder_hidden }),
            Box::new(ScriptedJoint { script, logits_len: 6, call: AtomicUsize::new(0) }),
            Box::new(VocabTokenizer::from_tokens(vec!["a".into(), "b".into(), "c".into(), "d".into()])),
            None,
            None,
        )
    }

    #[test]
    fn splitting_audio_across_process_calls_does_not_change_the_transcript() {
        // one real token (id 1) then blank, repeating: non-trivial but
        // bounded per-frame decode decisions.
        let script = vec![1u32, 4u32];
        let samples = vec![0.05f32; 1280 * 6]; // chunk_samples=2560, shift=1280

        let whole = scripted_session(SessionConfig::default().with_chunk_profile(ChunkProfile::Short), script.clone());
        whole.process(&samples).unwrap();
        let whole_text = whole.finish().unwrap();

        // split at a shift-aligned boundary partway through the input.
        let split = scripted_session(SessionConfig::default().with_chunk_profile(ChunkProfile::Short), script);
        let n = 1280 * 2;
        split.process(&samples[..n]).unwrap();
        split.process(&samples[n..]).unwrap();
        let split_text = split.finish().unwrap();

        assert_eq!(whole_text, split_text);
    }
}
