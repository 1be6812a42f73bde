//! Paired per-step score history.

use candle_core::{DType, Device, Tensor};

use crate::error::{Result, TrackerError};

/// Raw and constrained score vectors, one pair per processing call.
///
/// Both sequences always have the same length; [`ScoreStore::push`] is the only
/// way to grow them.
#[derive(Debug, Clone, Default)]
pub struct ScoreStore {
    unstructured: Vec<Vec<f32>>,
    structured: Vec<Vec<f32>>,
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unstructured: Vec<f32>, structured: Vec<f32>) {
        self.unstructured.push(unstructured);
        self.structured.push(structured);
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.unstructured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unstructured.is_empty()
    }

    pub fn unstructured(&self) -> &[Vec<f32>] {
        &self.unstructured
    }

    pub fn structured(&self) -> &[Vec<f32>] {
        &self.structured
    }

    /// Raw and constrained vectors for one step.
    pub fn step(&self, index: usize) -> Option<(&[f32], &[f32])> {
        let unstructured = self.unstructured.get(index)?;
        let structured = self.structured.get(index)?;
        Some((unstructured, structured))
    }

    /// Width of the first recorded raw vector.
    pub fn vocab_size(&self) -> Option<usize> {
        self.unstructured.first().map(Vec::len)
    }

    pub fn clear(&mut self) {
        self.unstructured.clear();
        self.structured.clear();
    }
}

/// Stack per-step rows into a `(steps, width)` tensor on the CPU.
///
/// An empty history yields a `(0, 0)` tensor.
pub(crate) fn stack_rows(rows: &[Vec<f32>]) -> Result<Tensor> {
    let Some(first) = rows.first() else {
        return Ok(Tensor::zeros((0, 0), DType::F32, &Device::Cpu)?);
    };
    let width = first.len();
    let mut flat = Vec::with_capacity(rows.len() * width);
    for (step, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(TrackerError::InconsistentWidth {
                step,
                expected: width,
                found: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }
    Ok(Tensor::from_vec(flat, (rows.len(), width), &Device::Cpu)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_sequences_aligned() {
        let mut store = ScoreStore::new();
        assert!(store.is_empty());
        assert_eq!(store.vocab_size(), None);

        store.push(vec![1.0, 2.0], vec![1.0, f32::NEG_INFINITY]);
        store.push(vec![3.0, 4.0], vec![3.0, 4.0]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.unstructured().len(), store.structured().len());
        assert_eq!(store.vocab_size(), Some(2));

        let (raw, constrained) = store.step(0).unwrap();
        assert_eq!(raw, &[1.0, 2.0]);
        assert!(constrained[1] == f32::NEG_INFINITY);
        assert!(store.step(2).is_none());
    }

    #[test]
    fn clear_empties_both_sequences() {
        let mut store = ScoreStore::new();
        store.push(vec![0.0], vec![0.0]);
        store.clear();
        assert!(store.is_empty());
        assert!(store.structured().is_empty());
    }

    #[test]
    fn stack_rows_is_step_major() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let stacked = stack_rows(&rows).unwrap();
        assert_eq!(stacked.dims(), &[2, 3]);
        assert_eq!(stacked.to_vec2::<f32>().unwrap(), rows);
    }

    #[test]
    fn stack_rows_empty_is_zero_sized() {
        let stacked = stack_rows(&[]).unwrap();
        assert_eq!(stacked.dims(), &[0, 0]);
    }

    #[test]
    fn stack_rows_rejects_ragged_history() {
        let rows = vec![vec![1.0, 2.0], vec![1.0, 2.0], vec![1.0]];
        let err = stack_rows(&rows).unwrap_err();
        assert!(matches!(
            err,
            TrackerError::InconsistentWidth {
                step: 2,
                expected: 2,
                found: 1
            }
        ));
    }
}
