//! Error classification and recovery.
//!
//! This module provides:
//! - The message-heuristic error classifier
//! - The per-phase circuit breaker
//! - The backoff schedule
//! - The recovery strategy selector
//! - The handler that applies a decision to the pipeline state

mod backoff;
mod circuit_breaker;
mod classifier;
mod handler;
mod strategy;

pub use backoff::{BackoffSchedule, JitterStrategy, DEFAULT_BACKOFF_MS};
pub use circuit_breaker::{CircuitBreaker, DEFAULT_THRESHOLD};
pub use classifier::{
    Classification, ClassifierConfig, ErrorCategory, ErrorClassifier, ErrorRecord, MatchedRule,
};
pub use handler::{PhaseFailure, RecoveryHandler, RecoveryOutcome};
pub use strategy::{EscalationReason, RecoveryAction, RecoverySelector, CORRECTIVE_INSTRUCTION};
