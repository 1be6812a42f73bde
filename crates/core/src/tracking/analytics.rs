//! Read-side queries over the recorded history.

use candle_core::Tensor;
use serde::Serialize;

use super::store::stack_rows;
use super::LogitTracker;
use crate::error::{Result, TrackerError};

/// Raw-score or probability matrices of shape `(vocab_size, steps)`.
///
/// Column `i` holds the values recorded at step `i`.
#[derive(Debug, Clone)]
pub struct ScoreMatrices {
    pub unstructured: Tensor,
    pub structured: Tensor,
}

impl ScoreMatrices {
    /// Build from step-major `(steps, vocab_size)` tensors.
    fn from_step_major(unstructured: &Tensor, structured: &Tensor) -> Result<Self> {
        Ok(Self {
            unstructured: unstructured.t()?.contiguous()?,
            structured: structured.t()?.contiguous()?,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.unstructured.dims().first().copied().unwrap_or(0)
    }

    pub fn num_steps(&self) -> usize {
        self.unstructured.dims().get(1).copied().unwrap_or(0)
    }

    /// Per-step columns as host vectors: `(unstructured, structured)`.
    pub(crate) fn columns(&self) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
        let unstructured = self.unstructured.t()?.contiguous()?.to_vec2::<f32>()?;
        let structured = self.structured.t()?.contiguous()?.to_vec2::<f32>()?;
        Ok((unstructured, structured))
    }
}

/// Which recorded positions a query covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Positions {
    #[default]
    All,
    One(usize),
    Many(Vec<usize>),
}

impl Positions {
    /// Requested positions that fall inside `0..num_steps`, in request order.
    fn resolve(self, num_steps: usize) -> Vec<usize> {
        match self {
            Positions::All => (0..num_steps).collect(),
            Positions::One(pos) => (pos < num_steps).then_some(pos).into_iter().collect(),
            Positions::Many(list) => list.into_iter().filter(|&pos| pos < num_steps).collect(),
        }
    }
}

impl From<usize> for Positions {
    fn from(pos: usize) -> Self {
        Positions::One(pos)
    }
}

impl From<Vec<usize>> for Positions {
    fn from(list: Vec<usize>) -> Self {
        Positions::Many(list)
    }
}

impl From<&[usize]> for Positions {
    fn from(list: &[usize]) -> Self {
        Positions::Many(list.to_vec())
    }
}

/// One candidate token at one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenReport {
    pub token_id: u32,
    pub token: String,
    pub unstructured_prob: f32,
    pub structured_prob: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unstructured_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_score: Option<f32>,
    /// Whether this token id was the one sampled from this position.
    /// Always false at the last recorded position, whose choice is not known yet.
    pub is_chosen: bool,
}

/// Top candidates at one position, with the text generated before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReport {
    pub position: usize,
    pub text_so_far: String,
    pub tokens: Vec<TokenReport>,
}

/// Row-wise softmax of a `(steps, vocab_size)` tensor.
///
/// `-inf` entries come out as exactly zero.
fn softmax_rows(matrix: &Tensor) -> candle_core::Result<Tensor> {
    if matrix.elem_count() == 0 {
        return Ok(matrix.clone());
    }
    let max = matrix.max_keepdim(1)?;
    let shifted = matrix.broadcast_sub(&max)?;
    let exp = shifted.exp()?;
    let sum = exp.sum_keepdim(1)?;
    exp.broadcast_div(&sum)
}

/// Vocabulary ids ranked by `max(a[i], b[i])`, highest first.
///
/// NaN ranks as `-inf`, so it sorts last. The sort is stable, so equal values
/// keep ascending id order.
pub(crate) fn rank_by_max(a: &[f32], b: &[f32]) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| x.max(y))
        .enumerate()
        .collect();
    indexed.sort_by(|l, r| rank_key(r.1).total_cmp(&rank_key(l.1)));
    indexed
}

fn rank_key(value: f32) -> f32 {
    if value.is_nan() {
        f32::NEG_INFINITY
    } else if value == 0.0 {
        // Treat -0.0 and 0.0 as a tie.
        0.0
    } else {
        value
    }
}

impl LogitTracker {
    fn step_scores(&self) -> Result<(Tensor, Tensor)> {
        let unstructured = stack_rows(self.store.unstructured())?;
        let structured = stack_rows(self.store.structured())?;
        Ok((unstructured, structured))
    }

    /// Per-step softmax of the recorded scores, as `(vocab_size, steps)` matrices.
    pub fn probabilities(&self) -> Result<ScoreMatrices> {
        let (unstructured, structured) = self.step_scores()?;
        ScoreMatrices::from_step_major(&softmax_rows(&unstructured)?, &softmax_rows(&structured)?)
    }

    /// The recorded scores, unchanged, as `(vocab_size, steps)` matrices.
    pub fn scores(&self) -> Result<ScoreMatrices> {
        let (unstructured, structured) = self.step_scores()?;
        ScoreMatrices::from_step_major(&unstructured, &structured)
    }

    /// Top `k` tokens at each requested position.
    ///
    /// Tokens are ranked by the larger of their unconstrained and constrained
    /// probability. Positions that were never recorded are skipped.
    pub fn top_tokens(
        &self,
        k: usize,
        positions: impl Into<Positions>,
        include_scores: bool,
    ) -> Result<Vec<PositionReport>> {
        let positions = positions.into().resolve(self.store.len());
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let (u_probs, s_probs) = self.probabilities()?.columns()?;
        let raw = if include_scores {
            Some(self.scores()?.columns()?)
        } else {
            None
        };
        let vocab = self.vocabulary()?;

        let mut results = Vec::with_capacity(positions.len());
        for pos in positions {
            let text_so_far = self.text_up_to(Some(pos))?;
            let chosen = self.alignment.chosen_at(pos);

            let tokens = rank_by_max(&u_probs[pos], &s_probs[pos])
                .into_iter()
                .take(k)
                .map(|(idx, _)| TokenReport {
                    token_id: idx as u32,
                    token: vocab.get(idx).cloned().unwrap_or_default(),
                    unstructured_prob: u_probs[pos][idx],
                    structured_prob: s_probs[pos][idx],
                    unstructured_score: raw.as_ref().map(|(u, _)| u[pos][idx]),
                    structured_score: raw.as_ref().map(|(_, s)| s[pos][idx]),
                    is_chosen: chosen == Some(idx as u32),
                })
                .collect();

            results.push(PositionReport {
                position: pos,
                text_so_far,
                tokens,
            });
        }

        Ok(results)
    }

    /// [`top_tokens`](Self::top_tokens) over all positions with the configured defaults.
    pub fn top_tokens_default(&self) -> Result<Vec<PositionReport>> {
        self.top_tokens(
            self.config.default_top_k,
            Positions::All,
            self.config.include_scores,
        )
    }

    /// Text of the chosen tokens before `position` (exclusive), or all of them.
    ///
    /// Positions past the end of the chosen log are clamped.
    pub fn text_up_to(&self, position: Option<usize>) -> Result<String> {
        let chosen = self.alignment.chosen();
        if chosen.is_empty() {
            return Ok(String::new());
        }

        let end = position.map_or(chosen.len(), |pos| pos.min(chosen.len()));
        if end == 0 {
            return Ok(String::new());
        }

        self.require_decoder()?
            .decode(&chosen[..end])
            .map_err(TrackerError::Decode)
    }

    /// Full text of the chosen tokens.
    pub fn text(&self) -> Result<String> {
        self.text_up_to(None)
    }
}
