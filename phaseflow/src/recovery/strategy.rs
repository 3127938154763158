//! Recovery strategy selection.

use super::backoff::BackoffSchedule;
use super::circuit_breaker::CircuitBreaker;
use super::classifier::ErrorCategory;
use crate::core::Phase;
use crate::state::PipelineState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Instruction queued for the next attempt after a recoverable failure.
pub const CORRECTIVE_INSTRUCTION: &str = "The previous attempt produced output that could not be used. \
Re-read the task, follow the expected output schema exactly, and return complete content.";

/// Why a failure was escalated to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The phase failed too many times in a row.
    CircuitBreaker,
    /// The error cannot be fixed by retrying.
    FatalError,
    /// A retryable error used up its retry budget.
    MaxRetriesExceeded,
    /// The failure carried no classifiable error.
    Unknown,
}

impl EscalationReason {
    /// Returns the string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitBreaker => "circuit_breaker",
            Self::FatalError => "fatal_error",
            Self::MaxRetriesExceeded => "max_retries_exceeded",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do about a phase-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Re-run the phase after a delay.
    Retry {
        /// Index into the backoff schedule.
        backoff_attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Re-run the phase with a corrective instruction.
    RetryWithFeedback {
        /// Instruction for the producer.
        instruction: String,
    },
    /// Pause for a human.
    Escalate {
        /// Why.
        reason: EscalationReason,
    },
}

impl RecoveryAction {
    /// Returns the action name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Retry { .. } => "retry",
            Self::RetryWithFeedback { .. } => "retry_with_feedback",
            Self::Escalate { .. } => "escalate",
        }
    }

    /// Returns true for escalation.
    #[must_use]
    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::Escalate { .. })
    }
}

/// Chooses a recovery action from classification, breaker state and budget.
#[derive(Debug, Clone, Default)]
pub struct RecoverySelector {
    breaker: CircuitBreaker,
    backoff: BackoffSchedule,
}

impl RecoverySelector {
    /// Creates a selector.
    #[must_use]
    pub fn new(breaker: CircuitBreaker, backoff: BackoffSchedule) -> Self {
        Self { breaker, backoff }
    }

    /// The breaker consulted by [`decide`](Self::decide).
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The backoff schedule.
    #[must_use]
    pub fn backoff(&self) -> &BackoffSchedule {
        &self.backoff
    }

    /// Decides what to do about a failure of `phase`. First match wins.
    ///
    /// `category` is `None` when the failure produced no error message to
    /// classify. Must be called before the failure is recorded on the
    /// breaker, so the backoff index is the pre-increment streak.
    #[must_use]
    pub fn decide(
        &self,
        category: Option<ErrorCategory>,
        state: &PipelineState,
        phase: Phase,
        max_retries: u32,
    ) -> RecoveryAction {
        if self.breaker.should_escalate(state, phase) {
            return RecoveryAction::Escalate {
                reason: EscalationReason::CircuitBreaker,
            };
        }

        let failures = self.breaker.consecutive_failures(state, phase);
        match category {
            Some(ErrorCategory::Fatal) => RecoveryAction::Escalate {
                reason: EscalationReason::FatalError,
            },
            Some(ErrorCategory::Retryable) if failures >= max_retries => RecoveryAction::Escalate {
                reason: EscalationReason::MaxRetriesExceeded,
            },
            Some(ErrorCategory::Retryable) => RecoveryAction::Retry {
                backoff_attempt: failures,
                delay: self.backoff.delay(failures),
            },
            Some(ErrorCategory::Recoverable) => RecoveryAction::RetryWithFeedback {
                instruction: CORRECTIVE_INSTRUCTION.to_string(),
            },
            None => RecoveryAction::Escalate {
                reason: EscalationReason::Unknown,
            },
        }
    }
}
