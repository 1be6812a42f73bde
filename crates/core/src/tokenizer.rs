//! Token decoding capability consumed by the tracker.
//!
//! The tracker never tokenizes text itself; it only needs to turn token ids
//! back into strings, both one id at a time (vocabulary table) and as a batch
//! (text reconstruction).

use std::path::Path;

use tokenizers::Tokenizer;

/// Decodes vocabulary ids into text.
pub trait TokenDecoder: Send + Sync {
    /// Decode a sequence of ids into a single string.
    fn decode(&self, ids: &[u32]) -> anyhow::Result<String>;

    /// Decode a single id.
    fn decode_token(&self, id: u32) -> anyhow::Result<String> {
        self.decode(&[id])
    }
}

pub struct TokenizerWrapper {
    inner: Tokenizer,
}

impl TokenizerWrapper {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let inner =
            Tokenizer::from_file(path).map_err(|e| anyhow::anyhow!("tokenizer load: {e}"))?;
        Ok(Self { inner })
    }

    pub fn from_tokenizer(inner: Tokenizer) -> Self {
        Self { inner }
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing(vocab_size: usize) -> Self {
        use tokenizers::models::wordlevel::WordLevel;
        use tokenizers::pre_tokenizers::whitespace::Whitespace;

        let mut vocab = ahash::AHashMap::new();
        for i in 0..vocab_size {
            vocab.insert(format!("t{i}"), i as u32);
        }
        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token("t0".into())
            .build()
            .expect("build test tokenizer model");
        let mut tokenizer = Tokenizer::new(model);
        tokenizer.with_pre_tokenizer(Some(Whitespace {}));
        Self { inner: tokenizer }
    }

    pub fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("encode: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Vocabulary size including added tokens.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl TokenDecoder for TokenizerWrapper {
    // Special tokens are kept: a tracked distribution may well put mass on them.
    fn decode(&self, ids: &[u32]) -> anyhow::Result<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| anyhow::anyhow!("decode: {e}"))
    }
}
