//! Phase transition records.

use super::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of one phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Phase before the change.
    pub from_phase: Phase,
    /// Phase after the change.
    pub to_phase: Phase,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// Why the change happened.
    pub reason: String,
}

impl PhaseTransition {
    /// Creates a transition stamped with the current time.
    #[must_use]
    pub fn new(from_phase: Phase, to_phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            from_phase,
            to_phase,
            timestamp: Utc::now(),
            reason: reason.into(),
        }
    }

    /// Returns true if the record obeys the transition rule.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.from_phase.check_transition(self.to_phase).is_ok()
    }
}
