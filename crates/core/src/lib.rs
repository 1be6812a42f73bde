pub mod attach;
pub mod config;
pub mod error;
pub mod processor;
pub mod tokenizer;
pub mod tracking;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use attach::{track_logits, track_logits_with, ProcessorSlot};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use processor::ConstraintProcessor;
pub use tokenizer::{TokenDecoder, TokenizerWrapper};
pub use tracking::{LogitTracker, Positions};
