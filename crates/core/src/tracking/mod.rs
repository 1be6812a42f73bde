//! Logit tracking for constrained generation.
//!
//! [`LogitTracker`] decorates an optional constraint processor. On every
//! generation step it records the model's raw scores and the scores after the
//! constraint, and works out which token was sampled at the previous step.
//! Once generation is done the analytics methods answer questions such as
//! "what would the model have preferred here without the grammar?".
//!
//! ```ignore
//! let mut tracker = LogitTracker::new(Some(Box::new(grammar)));
//! // inside the generation loop
//! let constrained = tracker.process(&[history.clone()], &logits)?;
//! // afterwards
//! for report in tracker.top_tokens(5, Positions::All, false)? {
//!     println!("{}: {:?}", report.position, report.tokens);
//! }
//! ```

mod alignment;
mod analytics;
mod store;
mod table;
mod vocabulary;

pub use alignment::TokenAlignment;
pub use analytics::{PositionReport, Positions, ScoreMatrices, TokenReport};
pub use store::ScoreStore;
pub use table::{Table, TableRow};
pub use vocabulary::VocabularyTable;

use std::sync::Arc;

use candle_core::{DType, Tensor};
use once_cell::sync::OnceCell;

use crate::config::TrackerConfig;
use crate::error::{BatchDimension, Result, TrackerError};
use crate::processor::ConstraintProcessor;
use crate::tokenizer::TokenDecoder;

/// Records raw and constrained scores for a single generation stream.
///
/// `clear()` resets per-step data only; the session flag and the vocabulary
/// cache live as long as the tracker.
pub struct LogitTracker {
    delegate: Option<Box<dyn ConstraintProcessor>>,
    store: ScoreStore,
    alignment: TokenAlignment,
    vocabulary: OnceCell<VocabularyTable>,
    decoder: Option<Arc<dyn TokenDecoder>>,
    config: TrackerConfig,
}

impl std::fmt::Debug for LogitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogitTracker")
            .field("delegate", &self.delegate.as_ref().map(|p| p.name()))
            .field("steps", &self.store.len())
            .field("chosen_tokens", &self.alignment.chosen())
            .field("started", &self.alignment.has_started())
            .field("has_decoder", &self.decoder.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl LogitTracker {
    /// Create a tracker around an optional constraint processor.
    ///
    /// If the processor carries a decoder, the tracker adopts it.
    pub fn new(delegate: Option<Box<dyn ConstraintProcessor>>) -> Self {
        let decoder = delegate.as_ref().and_then(|p| p.decoder());
        Self {
            delegate,
            store: ScoreStore::new(),
            alignment: TokenAlignment::new(),
            vocabulary: OnceCell::new(),
            decoder,
            config: TrackerConfig::default(),
        }
    }

    /// Tracker with no constraint: structured scores equal raw scores.
    pub fn unconstrained() -> Self {
        Self::new(None)
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_decoder(&mut self, decoder: Arc<dyn TokenDecoder>) {
        self.decoder = Some(decoder);
    }

    /// Record one generation step and return the scores the sampler should use.
    ///
    /// `token_history` must contain exactly one sequence and `scores` must have
    /// shape `(1, vocab_size)`. The delegate (if any) runs before anything is
    /// recorded, so a failing call leaves the tracker untouched.
    pub fn process(&mut self, token_history: &[Vec<u32>], scores: &Tensor) -> Result<Tensor> {
        let (batch, vocab_size) = scores.dims2()?;
        if batch != 1 {
            return Err(TrackerError::InvalidBatchSize {
                dimension: BatchDimension::Scores,
                size: batch,
            });
        }
        if token_history.len() != 1 {
            return Err(TrackerError::InvalidBatchSize {
                dimension: BatchDimension::TokenHistory,
                size: token_history.len(),
            });
        }

        let unstructured = host_row(scores)?;
        let (output, structured) = match self.delegate.as_mut() {
            Some(delegate) => {
                let processed = delegate
                    .process(token_history, scores)
                    .map_err(TrackerError::Processor)?;
                let processed_dims = processed.dims();
                if processed_dims != &[1, vocab_size] {
                    return Err(TrackerError::Processor(anyhow::anyhow!(
                        "{} returned scores of shape {:?}, expected [1, {}]",
                        delegate.name(),
                        processed_dims,
                        vocab_size
                    )));
                }
                let row = host_row(&processed)?;
                (processed, row)
            }
            None => (scores.clone(), unstructured.clone()),
        };

        let step = self.store.len();
        self.store.push(unstructured, structured);
        if let Some(token) = self.alignment.observe(&token_history[0]) {
            tracing::trace!(step, token, "recorded chosen token");
        }
        tracing::debug!(
            step,
            vocab_size,
            constrained = self.delegate.is_some(),
            "recorded logits"
        );

        Ok(output)
    }

    /// Drop all recorded steps and chosen tokens.
    pub fn clear(&mut self) {
        tracing::debug!(steps = self.store.len(), "clearing tracked logits");
        self.store.clear();
        self.alignment.clear();
    }

    pub fn num_steps(&self) -> usize {
        self.store.len()
    }

    pub fn store(&self) -> &ScoreStore {
        &self.store
    }

    pub fn unstructured_scores(&self) -> &[Vec<f32>] {
        self.store.unstructured()
    }

    pub fn structured_scores(&self) -> &[Vec<f32>] {
        self.store.structured()
    }

    pub fn chosen_tokens(&self) -> &[u32] {
        self.alignment.chosen()
    }

    pub fn has_started(&self) -> bool {
        self.alignment.has_started()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn delegate(&self) -> Option<&dyn ConstraintProcessor> {
        self.delegate.as_deref()
    }

    pub fn delegate_mut(&mut self) -> Option<&mut (dyn ConstraintProcessor + 'static)> {
        self.delegate.as_deref_mut()
    }

    /// Whether the vocabulary table has been built.
    pub fn is_vocabulary_cached(&self) -> bool {
        self.vocabulary.get().is_some()
    }

    /// Token strings indexed by vocabulary id.
    ///
    /// Built on first call from the width of the first recorded step, then
    /// cached for the tracker's lifetime. A decode failure is returned as
    /// [`TrackerError::Decode`] and nothing is cached.
    pub fn vocabulary(&self) -> Result<&[String]> {
        let decoder = self.require_decoder()?;
        let table = self.vocabulary.get_or_try_init(|| {
            let vocab_size = self
                .store
                .vocab_size()
                .ok_or(TrackerError::NoScoresRecorded)?;
            VocabularyTable::build(decoder.as_ref(), vocab_size).map_err(TrackerError::Decode)
        })?;
        Ok(table.as_slice())
    }

    /// Recover a tracker from a type-erased processor.
    pub fn downcast_ref(processor: &dyn ConstraintProcessor) -> Option<&LogitTracker> {
        processor.as_any().downcast_ref::<LogitTracker>()
    }

    pub fn downcast_mut(processor: &mut dyn ConstraintProcessor) -> Option<&mut LogitTracker> {
        processor.as_any_mut().downcast_mut::<LogitTracker>()
    }

    fn require_decoder(&self) -> Result<&Arc<dyn TokenDecoder>> {
        self.decoder
            .as_ref()
            .ok_or(TrackerError::NoTokenizerAvailable)
    }
}

impl ConstraintProcessor for LogitTracker {
    fn process(&mut self, token_history: &[Vec<u32>], scores: &Tensor) -> anyhow::Result<Tensor> {
        Ok(LogitTracker::process(self, token_history, scores)?)
    }

    fn decoder(&self) -> Option<Arc<dyn TokenDecoder>> {
        self.decoder.clone()
    }

    fn name(&self) -> &'static str {
        "logit_tracker"
    }
}

/// Host copy of the single row of a `(1, vocab_size)` tensor. Callers check the shape.
fn host_row(scores: &Tensor) -> Result<Vec<f32>> {
    Ok(scores.get(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}
