//! Row-oriented export of probabilities or scores.
//!
//! Export is part of the `table` feature; without it every export call fails
//! with [`TrackerError::MissingDependency`].

use serde::Serialize;

use super::analytics::{rank_by_max, ScoreMatrices};
use super::LogitTracker;
use crate::error::Result;
#[cfg(not(feature = "table"))]
use crate::error::TrackerError;

/// One `(position, token)` entry of an exported table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub position: usize,
    pub token: String,
    /// Value without the constraint (probability or raw score).
    pub natural: f32,
    /// Value after the constraint.
    pub constrained: f32,
    /// Whether this token was sampled at this position.
    pub chosen: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<TableRow>,
}

impl Table {
    pub const COLUMNS: [&'static str; 5] = ["position", "token", "natural", "constrained", "chosen"];

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<TableRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows belonging to one position.
    pub fn position(&self, position: usize) -> impl Iterator<Item = &TableRow> {
        self.rows.iter().filter(move |row| row.position == position)
    }

    /// The table as a JSON array of row objects.
    #[cfg(feature = "table")]
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.rows)
    }

    /// One JSON object per line.
    #[cfg(feature = "table")]
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(feature = "table")]
fn ensure_table_support() -> Result<()> {
    Ok(())
}

#[cfg(not(feature = "table"))]
fn ensure_table_support() -> Result<()> {
    Err(TrackerError::MissingDependency { capability: "table" })
}

impl LogitTracker {
    /// Flatten `values` into rows.
    ///
    /// Without `min_value` every `(position, token)` pair is emitted, ids in
    /// ascending order. With it, only entries whose larger value reaches the
    /// threshold are kept, at most `table_top_n` per position, highest first
    /// (an ascending argsort tail would list the same rows lowest first). NaN
    /// entries never pass a threshold.
    ///
    /// `chosen` compares token ids, so tokens that decode to the same text are
    /// not marked together.
    pub fn to_table(&self, values: &ScoreMatrices, min_value: Option<f32>) -> Result<Table> {
        ensure_table_support()?;

        let vocab = self.vocabulary()?;
        let (natural, constrained) = values.columns()?;

        let mut rows = Vec::new();
        for (pos, (u_vals, s_vals)) in natural.iter().zip(&constrained).enumerate() {
            let chosen = self.alignment.chosen_at(pos);
            let width = vocab.len().min(u_vals.len()).min(s_vals.len());

            let indices: Vec<usize> = match min_value {
                None => (0..width).collect(),
                Some(threshold) => rank_by_max(&u_vals[..width], &s_vals[..width])
                    .into_iter()
                    .take_while(|&(_, max)| max >= threshold)
                    .take(self.config.table_top_n)
                    .map(|(idx, _)| idx)
                    .collect(),
            };

            rows.extend(indices.into_iter().map(|idx| TableRow {
                position: pos,
                token: vocab[idx].clone(),
                natural: u_vals[idx],
                constrained: s_vals[idx],
                chosen: chosen == Some(idx as u32),
            }));
        }

        tracing::debug!(rows = rows.len(), ?min_value, "exported tracking table");
        Ok(Table { rows })
    }

    /// Probability table; see [`to_table`](Self::to_table).
    pub fn probabilities_table(&self, min_value: Option<f32>) -> Result<Table> {
        ensure_table_support()?;
        let values = self.probabilities()?;
        self.to_table(&values, min_value)
    }

    /// Raw score table; see [`to_table`](Self::to_table).
    pub fn scores_table(&self, min_value: Option<f32>) -> Result<Table> {
        ensure_table_support()?;
        let values = self.scores()?;
        self.to_table(&values, min_value)
    }
}

#[cfg(all(test, feature = "table"))]
mod tests {
    use std::sync::Arc;

    use candle_core::{DType, Device, Tensor};

    use super::*;
    use crate::config::TrackerConfig;
    use crate::testing::{MaskEvenProcessor, MockDecoder};

    fn row(values: &[f32]) -> Tensor {
        Tensor::from_slice(values, (1, values.len()), &Device::Cpu).unwrap()
    }

    fn tracker() -> LogitTracker {
        LogitTracker::new(Some(Box::new(MaskEvenProcessor::new())))
    }

    #[test]
    fn test_probabilities_table_is_dense() {
        let mut t = tracker();
        t.process(&[vec![0]], &row(&[2.0, -1.0, 1.0, 0.0, 3.0])).unwrap();

        let table = t.probabilities_table(None).unwrap();
        assert_eq!(table.len(), 5);
        assert!(table.rows().iter().all(|r| r.position == 0));
        assert!(table
            .rows()
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.natural)));
        let tokens: Vec<&str> = table.rows().iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, ["token_0", "token_1", "token_2", "token_3", "token_4"]);
    }

    #[test]
    fn test_scores_table_keeps_raw_values() {
        let mut t = tracker();
        t.process(&[vec![0]], &row(&[2.0, -1.0, 1.0, 0.0, 3.0])).unwrap();

        let table = t.scores_table(None).unwrap();
        assert!(!table
            .rows()
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.natural)));
        assert_eq!(table.rows()[4].natural, 3.0);
        assert!(table.rows()[4].constrained == f32::NEG_INFINITY);
        assert_eq!(table.rows()[3].constrained, 0.0);
    }

    #[test]
    fn test_min_value_filter() {
        let mut t = tracker();
        t.process(&[vec![0]], &row(&[2.0, -1.0, 1.0, 0.0, 3.0])).unwrap();

        let table = t.probabilities_table(Some(0.1)).unwrap();
        assert!(!table.is_empty());
        assert!(table
            .rows()
            .iter()
            .all(|r| r.natural >= 0.1 || r.constrained >= 0.1));

        let maxes: Vec<f32> = table
            .rows()
            .iter()
            .map(|r| r.natural.max(r.constrained))
            .collect();
        assert!(maxes.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_min_value_caps_rows_per_position() {
        let mut t = LogitTracker::unconstrained().with_decoder(Arc::new(MockDecoder));
        let flat = Tensor::zeros((1, 40), DType::F32, &Device::Cpu).unwrap();
        t.process(&[vec![0]], &flat).unwrap();
        t.process(&[vec![0, 7]], &flat).unwrap();

        let table = t.probabilities_table(Some(0.0)).unwrap();
        assert_eq!(table.position(0).count(), 10);
        assert_eq!(table.position(1).count(), 10);

        let t = t.with_config(TrackerConfig {
            table_top_n: 3,
            ..Default::default()
        });
        assert_eq!(t.probabilities_table(Some(0.0)).unwrap().len(), 6);
    }

    #[test]
    fn test_threshold_table_with_nan_logit() {
        let mut t = LogitTracker::unconstrained().with_decoder(Arc::new(MockDecoder));
        let mut logits: Vec<f32> = (0..64).map(|i| (i as f32 * 0.37).sin()).collect();
        logits[10] = f32::NAN;
        t.process(&[vec![0]], &row(&logits)).unwrap();

        let table = t.scores_table(Some(0.0)).unwrap();
        assert_eq!(table.len(), 10);
        assert!(table.rows().iter().all(|r| r.token != "token_10"));
        assert!(table.rows().iter().all(|r| r.natural >= 0.0));
        let values: Vec<f32> = table.rows().iter().map(|r| r.natural).collect();
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_threshold_above_everything_is_empty() {
        let mut t = tracker();
        t.process(&[vec![0]], &row(&[1.0, 1.0, 1.0])).unwrap();
        assert!(t.probabilities_table(Some(2.0)).unwrap().is_empty());
    }

    #[test]
    fn test_chosen_column() {
        let mut t = LogitTracker::unconstrained().with_decoder(Arc::new(MockDecoder));
        t.process(&[vec![0]], &row(&[0.0, 1.0, 2.0])).unwrap();
        t.process(&[vec![0, 2]], &row(&[0.0, 1.0, 2.0])).unwrap();

        let table = t.scores_table(None).unwrap();
        assert_eq!(table.len(), 6);

        let chosen: Vec<(usize, &str)> = table
            .rows()
            .iter()
            .filter(|r| r.chosen)
            .map(|r| (r.position, r.token.as_str()))
            .collect();
        assert_eq!(chosen, vec![(0, "token_2")]);
    }

    #[test]
    fn test_json_export() {
        let mut t = tracker();
        t.process(&[vec![0]], &row(&[0.5, 0.5])).unwrap();
        let table = t.scores_table(None).unwrap();

        let json = table.to_json().unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        for column in Table::COLUMNS {
            assert!(rows[1].get(column).is_some(), "missing column {column}");
        }
        // Masked entries serialize as null.
        assert!(rows[0]["constrained"].is_null());

        let lines = table.to_json_lines().unwrap();
        assert_eq!(lines.lines().count(), 2);
    }

    #[test]
    fn test_table_without_steps() {
        let t = tracker();
        assert!(matches!(
            t.probabilities_table(None).unwrap_err(),
            crate::error::TrackerError::NoScoresRecorded
        ));
    }
}

#[cfg(all(test, not(feature = "table")))]
mod missing_feature_tests {
    use super::*;
    use crate::testing::MaskEvenProcessor;

    #[test]
    fn test_export_requires_table_feature() {
        let t = LogitTracker::new(Some(Box::new(MaskEvenProcessor::new())));
        let err = t.probabilities_table(None).unwrap_err();
        assert!(matches!(
            err,
            TrackerError::MissingDependency { capability: "table" }
        ));
        assert!(t.scores_table(Some(0.1)).is_err());
    }
}
