//! Summary of one `run` call.

use crate::core::Phase;
use crate::guardrails::GuardrailCounts;
use crate::state::{PipelineError, PipelineState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a run ended with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run id.
    pub run_id: String,
    /// Phase the run stopped in.
    pub final_phase: Phase,
    /// Process exit code (see [`PipelineState::exit_code`]).
    pub exit_code: i32,
    /// Loop iterations used by this call.
    pub iterations: usize,
    /// Every error recorded on the run.
    pub errors: Vec<PipelineError>,
    /// Guardrail pass/fail counters.
    pub guardrail_stats: BTreeMap<String, GuardrailCounts>,
}

impl RunReport {
    pub(crate) fn new(
        state: &PipelineState,
        iterations: usize,
        guardrail_stats: BTreeMap<String, GuardrailCounts>,
    ) -> Self {
        Self {
            run_id: state.run_id.clone(),
            final_phase: state.current_phase,
            exit_code: state.exit_code(),
            iterations,
            errors: state.errors.clone(),
            guardrail_stats,
        }
    }

    /// Returns true when the run completed with every error resolved.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Errors not resolved by a later success.
    pub fn unresolved_errors(&self) -> impl Iterator<Item = &PipelineError> {
        self.errors.iter().filter(|e| !e.resolved)
    }
}
