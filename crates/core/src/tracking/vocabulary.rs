//! Token-id-to-string table for reporting.
//!
//! `VocabularyTable` decodes every id of the score vector's width once; the
//! tracker builds it lazily on first use and keeps it for its lifetime.

use anyhow::Context;

use crate::tokenizer::TokenDecoder;

/// Maps each token ID to its decoded string.
#[derive(Debug, Clone, Default)]
pub struct VocabularyTable {
    /// `tokens[token_id]` = decoded text for that token.
    tokens: Vec<String>,
}

impl VocabularyTable {
    /// Build a table by decoding each token individually.
    ///
    /// The first id that fails to decode aborts the build.
    pub fn build(decoder: &dyn TokenDecoder, vocab_size: usize) -> anyhow::Result<Self> {
        let tokens = (0..vocab_size as u32)
            .map(|token_id| {
                decoder
                    .decode_token(token_id)
                    .with_context(|| format!("decoding vocabulary token {token_id}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        tracing::debug!(vocab_size, "built vocabulary table");
        Ok(Self { tokens })
    }

    /// Get the string for a token ID.
    #[inline]
    pub fn get(&self, token_id: usize) -> Option<&str> {
        self.tokens.get(token_id).map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tokens
    }
}
