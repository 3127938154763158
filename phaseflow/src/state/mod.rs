//! Pipeline state: the aggregate root of one run.
//!
//! This module provides:
//! - `PipelineState` with the guarded transition and retry API
//! - `PipelineError` audit records
//! - Escalation prompts staged in metadata
//! - Well-known metadata keys

mod escalation;
pub mod meta;
mod pipeline_state;
#[cfg(test)]
mod state_tests;

pub use escalation::{EscalationRequest, DEFAULT_OPTIONS};
pub use pipeline_state::{PipelineError, PipelineState, DEFAULT_MAX_RETRIES};
