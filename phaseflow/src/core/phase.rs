//! Pipeline phases and the transition rule between them.

use crate::errors::PhaseflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A phase of the generation pipeline.
///
/// The first six variants form the ordered main line. `Error` and
/// `AwaitingHuman` are side states reachable from any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Input validation.
    Intake,
    /// Requirements and architecture.
    Planning,
    /// Code generation.
    Development,
    /// Test generation and execution.
    Testing,
    /// Deployment artifacts.
    Deployment,
    /// Run finished.
    Complete,
    /// Run failed.
    Error,
    /// Run paused for a human decision.
    AwaitingHuman,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Intake
    }
}

impl Phase {
    /// The ordered main line, in execution order.
    pub const ORDERED: [Self; 6] = [
        Self::Intake,
        Self::Planning,
        Self::Development,
        Self::Testing,
        Self::Deployment,
        Self::Complete,
    ];

    /// Phases that run a stage.
    pub const STAGES: [Self; 5] = [
        Self::Intake,
        Self::Planning,
        Self::Development,
        Self::Testing,
        Self::Deployment,
    ];

    /// Returns the string form used in serialization and metadata keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Planning => "planning",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Deployment => "deployment",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::AwaitingHuman => "awaiting_human",
        }
    }

    /// Position on the main line, or `None` for side states.
    #[must_use]
    pub fn ordinal(&self) -> Option<usize> {
        Self::ORDERED.iter().position(|p| p == self)
    }

    /// Returns the next phase on the main line.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        self.ordinal().and_then(|i| Self::ORDERED.get(i + 1).copied())
    }

    /// Returns the previous phase on the main line.
    #[must_use]
    pub fn previous(&self) -> Option<Self> {
        self.ordinal()
            .and_then(|i| i.checked_sub(1))
            .map(|i| Self::ORDERED[i])
    }

    /// Returns true for `Error` and `AwaitingHuman`.
    #[must_use]
    pub fn is_side_state(&self) -> bool {
        matches!(self, Self::Error | Self::AwaitingHuman)
    }

    /// Returns true for phases that end a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Returns true if a stage producer runs in this phase.
    #[must_use]
    pub fn runs_stage(&self) -> bool {
        Self::STAGES.contains(self)
    }

    /// Checks the transition rule.
    ///
    /// Moves into a side state are always allowed. Any other move must be a
    /// single forward step along [`Phase::ORDERED`].
    pub fn check_transition(self, to: Self) -> Result<(), PhaseflowError> {
        if to.is_side_state() {
            return Ok(());
        }
        match self.next() {
            Some(next) if next == to => Ok(()),
            Some(next) => Err(PhaseflowError::invalid_transition(
                self,
                to,
                format!("expected a single step to '{next}'"),
            )),
            None if self.is_side_state() => Err(PhaseflowError::invalid_transition(
                self,
                to,
                "side states are left by rollback, not by transition",
            )),
            None => Err(PhaseflowError::invalid_transition(
                self,
                to,
                "no phase follows complete",
            )),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = PhaseflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        [Self::ORDERED.as_slice(), &[Self::Error, Self::AwaitingHuman]]
            .concat()
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| PhaseflowError::UnknownPhase(s.to_string()))
    }
}
