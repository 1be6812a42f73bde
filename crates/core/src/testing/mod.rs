//! Shared test utilities for logit-tracker-core.
//!
//! Mock decoders and constraint processors with predictable behaviour, used
//! by the unit tests and (behind the `test-utils` feature) by downstream crates.

use std::sync::Arc;

use candle_core::Tensor;

use crate::processor::{map_rows, ConstraintProcessor};
use crate::tokenizer::TokenDecoder;

/// Decodes id `n` as `token_n` and concatenates sequences without separators.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockDecoder;

impl TokenDecoder for MockDecoder {
    fn decode(&self, ids: &[u32]) -> anyhow::Result<String> {
        Ok(ids.iter().map(|id| format!("token_{id}")).collect())
    }
}

/// Masks every even vocabulary index to `-inf` and carries a [`MockDecoder`].
pub struct MaskEvenProcessor {
    decoder: Arc<dyn TokenDecoder>,
    pub calls: usize,
}

impl MaskEvenProcessor {
    pub fn new() -> Self {
        Self {
            decoder: Arc::new(MockDecoder),
            calls: 0,
        }
    }
}

impl Default for MaskEvenProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintProcessor for MaskEvenProcessor {
    fn process(&mut self, _token_history: &[Vec<u32>], scores: &Tensor) -> anyhow::Result<Tensor> {
        self.calls += 1;
        let masked = map_rows(scores, |row| {
            for score in row.iter_mut().step_by(2) {
                *score = f32::NEG_INFINITY;
            }
        })?;
        Ok(masked)
    }

    fn decoder(&self) -> Option<Arc<dyn TokenDecoder>> {
        Some(self.decoder.clone())
    }

    fn name(&self) -> &'static str {
        "mask_even"
    }
}

/// Processor that passes scores through and carries no decoder.
#[derive(Debug, Default)]
pub struct PassthroughProcessor;

impl ConstraintProcessor for PassthroughProcessor {
    fn process(&mut self, _token_history: &[Vec<u32>], scores: &Tensor) -> anyhow::Result<Tensor> {
        Ok(scores.clone())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Processor that always fails.
#[derive(Debug, Default)]
pub struct FailingProcessor;

impl ConstraintProcessor for FailingProcessor {
    fn process(&mut self, _token_history: &[Vec<u32>], _scores: &Tensor) -> anyhow::Result<Tensor> {
        anyhow::bail!("grammar rejected the prefix")
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
