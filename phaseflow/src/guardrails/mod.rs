//! Guardrails: content-validation gates on stage output.
//!
//! This module provides:
//! - The [`GuardrailPredicate`] trait and a few generic predicates
//! - A per-stage [`GuardrailRegistry`]
//! - Pass/fail counters per guardrail name
//! - The guardrail-retry contract wrapping one producer invocation

mod predicate;
mod registry;
mod retry;
mod stats;

pub use predicate::{
    AcceptAll, FnGuardrail, GuardrailChain, GuardrailPredicate, GuardrailVerdict, RequireDataKeys,
};
pub use registry::GuardrailRegistry;
pub use retry::{AttemptOutcome, GuardrailRetry, EMPTY_OUTPUT_FEEDBACK};
pub use stats::{GuardrailCounts, GuardrailStats};
