//! Assertions over pipeline state.

use crate::core::Phase;
use crate::state::PipelineState;

/// Asserts the current phase.
pub fn assert_phase(state: &PipelineState, expected: Phase) {
    assert_eq!(
        state.current_phase, expected,
        "Expected phase {expected}, got {} (history: {:?})",
        state.current_phase,
        state
            .phase_history
            .iter()
            .map(|t| t.to_phase.as_str())
            .collect::<Vec<_>>()
    );
}

/// Asserts that the history satisfies the transition invariants.
pub fn assert_history_valid(state: &PipelineState) {
    if let Err(err) = state.validate_history() {
        panic!("Invalid phase history: {err}");
    }
}

/// Asserts the exit code.
pub fn assert_exit_code(state: &PipelineState, expected: i32) {
    assert_eq!(
        state.exit_code(),
        expected,
        "Expected exit code {expected} in phase {} with {} unresolved error(s)",
        state.current_phase,
        state.unresolved_errors().count()
    );
}

/// Asserts the destination phases of the history, in order.
pub fn assert_visited(state: &PipelineState, expected: &[Phase]) {
    let visited: Vec<Phase> = state.phase_history.iter().map(|t| t.to_phase).collect();
    assert_eq!(visited, expected, "Unexpected phase history");
}
