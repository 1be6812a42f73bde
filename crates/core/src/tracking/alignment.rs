//! Recovers the chosen token for each step from the growing token history.
//!
//! The scores for step `i` are seen before the token sampled from them, which
//! only shows up as the last element of the history passed to step `i + 1`.
//! The chosen log therefore trails the score history by one entry.

/// Chosen-token log plus the session flag that suppresses the first append.
#[derive(Debug, Clone, Default)]
pub struct TokenAlignment {
    started: bool,
    chosen: Vec<u32>,
}

impl TokenAlignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the history of one processing call.
    ///
    /// Returns the token appended to the log, if any. The first call of a
    /// session only marks the session as started.
    pub fn observe(&mut self, history: &[u32]) -> Option<u32> {
        if !self.started {
            self.started = true;
            return None;
        }
        if history.len() > 1 {
            let token = *history.last()?;
            self.chosen.push(token);
            return Some(token);
        }
        None
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn chosen(&self) -> &[u32] {
        &self.chosen
    }

    /// Token chosen from the distribution recorded at `position`.
    pub fn chosen_at(&self, position: usize) -> Option<u32> {
        self.chosen.get(position).copied()
    }

    /// Empties the log. The started flag is session state and survives.
    pub fn clear(&mut self) {
        self.chosen.clear();
    }
}
