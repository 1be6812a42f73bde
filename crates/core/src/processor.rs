//! Constraint processors: transformations that map raw scores to constrained scores.
//!
//! A processor receives the token history and a `(1, vocab_size)` score tensor
//! and returns a tensor of the same shape, typically with disallowed tokens set
//! to `-inf`. The tracker wraps one as its delegate and is itself a processor,
//! so it can be installed anywhere a processor can.

use std::any::Any;
use std::sync::Arc;

use ahash::AHashSet;
use candle_core::{DType, Tensor};

use crate::tokenizer::TokenDecoder;

/// Upcast to `Any` so an installed processor can be recovered by concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Trait for score transformations applied by a generation pipeline before sampling.
pub trait ConstraintProcessor: AsAny + Send + Sync {
    /// Transform the scores for the current step.
    ///
    /// `token_history` holds one token sequence per batch entry and `scores`
    /// has shape `(batch, vocab_size)`.
    fn process(&mut self, token_history: &[Vec<u32>], scores: &Tensor) -> anyhow::Result<Tensor>;

    /// Decoder carried by this processor, if any.
    fn decoder(&self) -> Option<Arc<dyn TokenDecoder>> {
        None
    }

    /// Human-readable name for debugging and logs.
    fn name(&self) -> &'static str;
}

/// Apply `mask` to every row of a `(batch, vocab_size)` tensor, preserving dtype and device.
pub(crate) fn map_rows(
    scores: &Tensor,
    mut mask: impl FnMut(&mut [f32]),
) -> candle_core::Result<Tensor> {
    let (batch, vocab_size) = scores.dims2()?;
    if vocab_size == 0 {
        return Ok(scores.clone());
    }
    let dtype = scores.dtype();
    let mut flat = scores
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    for row in flat.chunks_mut(vocab_size) {
        mask(row);
    }
    Tensor::from_vec(flat, (batch, vocab_size), scores.device())?.to_dtype(dtype)
}

/// Masks every token outside an allow-list to `-inf`.
pub struct AllowedTokensProcessor {
    allowed_ids: AHashSet<u32>,
    decoder: Option<Arc<dyn TokenDecoder>>,
}

impl AllowedTokensProcessor {
    pub fn new(allowed_ids: Vec<u32>) -> Self {
        Self {
            allowed_ids: allowed_ids.into_iter().collect(),
            decoder: None,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }
}

impl ConstraintProcessor for AllowedTokensProcessor {
    fn process(&mut self, _token_history: &[Vec<u32>], scores: &Tensor) -> anyhow::Result<Tensor> {
        let masked = map_rows(scores, |row| {
            for (idx, score) in row.iter_mut().enumerate() {
                if !self.allowed_ids.contains(&(idx as u32)) {
                    *score = f32::NEG_INFINITY;
                }
            }
        })?;
        Ok(masked)
    }

    fn decoder(&self) -> Option<Arc<dyn TokenDecoder>> {
        self.decoder.clone()
    }

    fn name(&self) -> &'static str {
        "allowed_tokens"
    }
}

/// Sets the listed token ids to `-inf`; ids past the vocabulary are ignored.
pub struct BannedTokensProcessor {
    banned_ids: Vec<u32>,
    decoder: Option<Arc<dyn TokenDecoder>>,
}

impl BannedTokensProcessor {
    pub fn new(banned_ids: Vec<u32>) -> Self {
        Self {
            banned_ids,
            decoder: None,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }
}

impl ConstraintProcessor for BannedTokensProcessor {
    fn process(&mut self, _token_history: &[Vec<u32>], scores: &Tensor) -> anyhow::Result<Tensor> {
        let masked = map_rows(scores, |row| {
            for &token_id in &self.banned_ids {
                let idx = token_id as usize;
                if idx < row.len() {
                    row[idx] = f32::NEG_INFINITY;
                }
            }
        })?;
        Ok(masked)
    }

    fn decoder(&self) -> Option<Arc<dyn TokenDecoder>> {
        self.decoder.clone()
    }

    fn name(&self) -> &'static str {
        "banned_tokens"
    }
}
