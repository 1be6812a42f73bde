use std::fmt;

use thiserror::Error;

/// Which input of a processing call violated the single-sequence constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDimension {
    /// The token history held more (or fewer) than one sequence.
    TokenHistory,
    /// The score tensor held more (or fewer) than one row.
    Scores,
}

impl fmt::Display for BatchDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchDimension::TokenHistory => write!(f, "token history"),
            BatchDimension::Scores => write!(f, "scores"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("logit tracking only supports single-batch processing: {dimension} has batch size {size}")]
    InvalidBatchSize {
        dimension: BatchDimension,
        size: usize,
    },

    #[error("no tokenizer available for mapping tokens")]
    NoTokenizerAvailable,

    #[error("the `{capability}` feature is required for tabular export")]
    MissingDependency { capability: &'static str },

    #[error("logit tracking is not supported for this pipeline: no processor slot")]
    UnsupportedPipeline,

    #[error("no scores have been recorded yet")]
    NoScoresRecorded,

    #[error("inconsistent score width at step {step}: expected {expected}, found {found}")]
    InconsistentWidth {
        step: usize,
        expected: usize,
        found: usize,
    },

    #[error("constraint processor failed: {0}")]
    Processor(#[source] anyhow::Error),

    #[error("decode error: {0}")]
    Decode(#[source] anyhow::Error),

    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
