//! Maps accumulated token ids to text.
//!
//! `vocab.json` is loaded once into a plain id-to-token map.
//! SentencePiece-style `▁` word-boundary markers are honored if
//! present in the vocab but never assumed: a plain space-joined vocab
//! round-trips unchanged.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, Result};

pub trait Tokenizer: Send + Sync {
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// Loads `vocab.json` as `{ "<id>": "<token>" }` and assembles text by
/// concatenating tokens, turning the SentencePiece `▁` marker into a
/// preceding space when present.
pub struct VocabTokenizer {
    id_to_token: HashMap<u32, String>,
}

impl VocabTokenizer {
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
        let path = model_dir.as_ref().join("vocab.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| EngineError::TokenizerFailed(format!("failed to read {}: {e}", path.display())))?;

        let raw: HashMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| EngineError::TokenizerFailed(format!("failed to parse vocab: {e}")))?;

        let mut id_to_token = HashMap::with_capacity(raw.len());
        for (id_str, token) in raw {
            let id: u32 = id_str
                .parse()
                .map_err(|_| EngineError::TokenizerFailed(format!("non-numeric vocab id '{id_str}'")))?;
            id_to_token.insert(id, token);
        }

        tracing::info!(vocab_size = id_to_token.len(), "loaded ASR vocabulary");

        Ok(Self { id_to_token })
    }

    pub fn from_tokens(tokens: Vec<String>) -> Self {
        Self {
            id_to_token: tokens.into_iter().enumerate().map(|(i, t)| (i as u32, t)).collect(),
        }
    }
}

impl Tokenizer for VocabTokenizer {
    fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut text = String::new();
        for &id in ids {
            let token = self
                .id_to_token
                .get(&id)
                .ok_or_else(|| EngineError::TokenizerFailed(format!("unknown token id {id}")))?;
            if let Some(rest) = token.strip_prefix('\u{2581}') {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(rest);
            } else {
                text.push_str(token);
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_sentencepiece_word_markers_with_spaces() {
        let tok = VocabTokenizer::from_tokens(vec!["\u{2581}hello".into(), "\u{2581}world".into()]);
        assert_eq!(tok.decode(&[0, 1]).unwrap(), "hello world");
    }

    #[test]
    fn concatenates_subword_continuations_without_spaces() {
        let tok = VocabTokenizer::from_tokens(vec!["\u{2581}un".into(), "able".into()]);
        assert_eq!(tok.decode(&[0, 1]).unwrap(), "unable");
    }

    #[test]
    fn empty_ids_decode_to_empty_string() {
        let tok = VocabTokenizer::from_tokens(vec!["\u{2581}hi".into()]);
        assert_eq!(tok.decode(&[]).unwrap(), "");
    }

    #[test]
    fn unknown_id_fails_as_tokenizer_failed() {
        let tok = VocabTokenizer::from_tokens(vec!["\u{2581}hi".into()]);
        let err = tok.decode(&[5]).unwrap_err();
        assert!(matches!(err, EngineError::TokenizerFailed(_)));
    }
}
