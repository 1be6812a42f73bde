//! Installing a tracker into an existing generation pipeline.
//!
//! A pipeline exposes its processor through [`ProcessorSlot`], typically an
//! `Option<Box<dyn ConstraintProcessor>>` field on the request or generator.
//! [`track_logits`] moves whatever processor is there into a new
//! [`LogitTracker`] and puts the tracker in its place.

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::processor::ConstraintProcessor;
use crate::tracking::LogitTracker;

/// Access to a pipeline's constraint processor.
pub trait ProcessorSlot {
    /// The processor slot, or `None` if this pipeline has no place for one.
    fn processor_slot(&mut self) -> Option<&mut Option<Box<dyn ConstraintProcessor>>>;

    /// The currently installed processor.
    fn processor(&self) -> Option<&dyn ConstraintProcessor>;

    /// The installed tracker, if the slot holds one.
    fn tracker(&self) -> Option<&LogitTracker> {
        self.processor().and_then(LogitTracker::downcast_ref)
    }

    fn tracker_mut(&mut self) -> Option<&mut LogitTracker> {
        let slot = self.processor_slot()?;
        LogitTracker::downcast_mut(slot.as_deref_mut()?)
    }
}

impl ProcessorSlot for Option<Box<dyn ConstraintProcessor>> {
    fn processor_slot(&mut self) -> Option<&mut Option<Box<dyn ConstraintProcessor>>> {
        Some(self)
    }

    fn processor(&self) -> Option<&dyn ConstraintProcessor> {
        self.as_deref()
    }
}

/// Wrap the pipeline's processor in a [`LogitTracker`] with default settings.
///
/// Fails with [`TrackerError::UnsupportedPipeline`] if the pipeline has no
/// processor slot; the pipeline is not modified in that case.
pub fn track_logits<P: ProcessorSlot + ?Sized>(pipeline: &mut P) -> Result<&mut P> {
    track_logits_with(pipeline, TrackerConfig::default())
}

/// [`track_logits`] with an explicit tracker configuration.
pub fn track_logits_with<P: ProcessorSlot + ?Sized>(
    pipeline: &mut P,
    config: TrackerConfig,
) -> Result<&mut P> {
    let slot = pipeline
        .processor_slot()
        .ok_or(TrackerError::UnsupportedPipeline)?;

    let delegate = slot.take();
    let delegate_name = delegate.as_ref().map(|p| p.name());
    let tracker = LogitTracker::new(delegate).with_config(config);
    let has_decoder = tracker.decoder().is_some();
    *slot = Some(Box::new(tracker));

    tracing::info!(
        delegate = delegate_name.unwrap_or("none"),
        has_decoder,
        "logit tracking enabled"
    );
    Ok(pipeline)
}
