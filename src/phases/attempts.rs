//! In-memory retry accounting per (subtask, TDD phase) pair.
//!
//! Counts are not persisted and have no cross-process visibility; a resuming
//! service re-seeds them from the persisted per-subtask attempt counts.
//! Attempt accounting is deliberately separate from the phase orchestrators:
//! they decide whether an attempt was valid, this tracker decides how many
//! attempts have been made.

use std::collections::HashMap;

use crate::workflow::context::TddPhase;

pub struct AttemptTracker {
    counts: HashMap<(String, TddPhase), u32>,
    max_attempts: u32,
}

impl AttemptTracker {
    /// Create a tracker with the given retry ceiling (`max_attempts >= 1`).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            counts: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Increment and return the attempt count for the pair; first call
    /// returns 1.
    pub fn record_attempt(&mut self, subtask_id: &str, phase: TddPhase) -> u32 {
        let count = self
            .counts
            .entry((subtask_id.to_string(), phase))
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Current count for the pair; untracked keys report 0.
    pub fn attempt_count(&self, subtask_id: &str, phase: TddPhase) -> u32 {
        self.counts
            .get(&(subtask_id.to_string(), phase))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the pair has reached the ceiling (`count >= max_attempts`).
    /// Untracked keys never report exceeded.
    pub fn has_exceeded_max_attempts(&self, subtask_id: &str, phase: TddPhase) -> bool {
        self.attempt_count(subtask_id, phase) >= self.max_attempts
    }

    /// Zero the count for one specific pair, leaving all other keys intact.
    /// Called when a subtask/phase is abandoned or successfully advanced
    /// past, so stale counts never leak into the next cycle for the same key.
    pub fn reset_attempts(&mut self, subtask_id: &str, phase: TddPhase) {
        self.counts.remove(&(subtask_id.to_string(), phase));
    }

    /// Seed a count directly, used when resuming a persisted workflow to
    /// rebuild in-memory state from `SubtaskInfo.attempts`.
    pub fn seed_attempts(&mut self, subtask_id: &str, phase: TddPhase, count: u32) {
        if count == 0 {
            self.counts.remove(&(subtask_id.to_string(), phase));
        } else {
            self.counts.insert((subtask_id.to_string(), phase), count);
        }
    }
}
