//! Error types for the phaseflow orchestration core.
//!
//! Stage-level failures (a producer erroring, a guardrail rejecting output)
//! are data: they flow through the routing engine and recovery selector.
//! The variants here are the failures the core itself raises. Two of them,
//! [`PhaseflowError::RetryLimitExceeded`] and
//! [`PhaseflowError::InvalidTransition`], signal a violated invariant and
//! stop the run.

use crate::core::Phase;
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for phaseflow operations.
#[derive(Debug, Error)]
pub enum PhaseflowError {
    /// A phase transition skipped or reversed the ordered phase sequence.
    #[error("Invalid transition from '{from}' to '{to}': {reason}")]
    InvalidTransition {
        /// Phase the state was in.
        from: Phase,
        /// Phase that was requested.
        to: Phase,
        /// Why the transition was rejected.
        reason: String,
    },

    /// A phase's retry counter was incremented past `max_retries`.
    #[error("Retry limit exceeded for phase '{phase}': {count} retries already used (max {max_retries})")]
    RetryLimitExceeded {
        /// The offending phase.
        phase: Phase,
        /// Retries recorded before the failed increment.
        count: u32,
        /// The configured ceiling.
        max_retries: u32,
    },

    /// A stage's guardrail never passed within its attempt budget.
    #[error("Guardrail '{guardrail}' exhausted for stage '{stage}' after {attempts} attempt(s): {last_feedback}")]
    GuardrailExhausted {
        /// The stage whose output kept failing validation.
        stage: Phase,
        /// Name of the guardrail predicate.
        guardrail: String,
        /// Attempts made.
        attempts: u32,
        /// Feedback from the final failed check.
        last_feedback: String,
    },

    /// The run or an in-flight stage attempt was cancelled by the host.
    #[error("Pipeline cancelled during '{phase}': {reason}")]
    Cancelled {
        /// Phase that was executing.
        phase: Phase,
        /// Reason given to the cancellation token.
        reason: String,
    },

    /// A loaded snapshot violated a state invariant.
    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    /// The orchestrator looped more times than configured.
    #[error("Iteration limit of {limit} reached while in phase '{phase}'")]
    IterationLimit {
        /// Phase the run was stuck in.
        phase: Phase,
        /// The configured limit.
        limit: usize,
    },

    /// A phase name could not be parsed.
    #[error("Unknown phase: '{0}'")]
    UnknownPhase(String),

    /// A classifier rule failed to compile.
    #[error("Invalid classifier pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Configuration was rejected by validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PhaseflowError {
    /// Creates an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: Phase, to: Phase, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from,
            to,
            reason: reason.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(phase: Phase, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            phase,
            reason: reason.into(),
        }
    }

    /// Returns true for errors that mean a core invariant was broken.
    ///
    /// These abort the run instead of being routed to recovery.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::RetryLimitExceeded { .. } | Self::InvalidState(_)
        )
    }

    /// Returns the phase the error names, if any.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::InvalidTransition { from, .. } => Some(*from),
            Self::RetryLimitExceeded { phase, .. }
            | Self::Cancelled { phase, .. }
            | Self::IterationLimit { phase, .. }
            | Self::GuardrailExhausted { stage: phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns a stable machine-readable code for the error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::RetryLimitExceeded { .. } => "RetryLimitExceeded",
            Self::GuardrailExhausted { .. } => "GuardrailExhausted",
            Self::Cancelled { .. } => "Cancelled",
            Self::InvalidState(_) => "InvalidState",
            Self::IterationLimit { .. } => "IterationLimit",
            Self::UnknownPhase(_) => "UnknownPhase",
            Self::InvalidPattern { .. } => "InvalidPattern",
            Self::Config(_) => "Config",
            Self::Serialization(_) => "Serialization",
            Self::Io(_) => "Io",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(phase) = self.phase() {
            map.insert("phase".to_string(), serde_json::json!(phase.as_str()));
        }
        map.insert(
            "invariant_violation".to_string(),
            serde_json::json!(self.is_invariant_violation()),
        );
        map
    }
}

/// Convenience result alias.
pub type Result<T, E = PhaseflowError> = std::result::Result<T, E>;
