//! Per-phase circuit breaker.
//!
//! Counters live in the state's metadata bag, so they are persisted with
//! the run and cleared when a snapshot is loaded.

use crate::core::Phase;
use crate::state::{meta, PipelineState};
use tracing::{debug, warn};

/// Default number of consecutive failures before escalation.
pub const DEFAULT_THRESHOLD: u32 = 3;

/// Forces escalation after a run of consecutive failures in one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreaker {
    threshold: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl CircuitBreaker {
    /// Creates a breaker with the given threshold.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// The configured threshold.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Current streak for `phase`.
    #[must_use]
    pub fn consecutive_failures(&self, state: &PipelineState, phase: Phase) -> u32 {
        state
            .meta(&meta::consecutive_failures_key(phase))
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    }

    /// Extends the streak for `phase` and returns the new count.
    pub fn record_failure(&self, state: &mut PipelineState, phase: Phase) -> u32 {
        let count = self.consecutive_failures(state, phase).saturating_add(1);
        state.set_meta(meta::consecutive_failures_key(phase), count.into());
        if count >= self.threshold {
            warn!(
                run_id = %state.run_id,
                phase = %phase,
                consecutive_failures = count,
                threshold = self.threshold,
                "Circuit breaker open"
            );
        } else {
            debug!(phase = %phase, consecutive_failures = count, "Recorded phase failure");
        }
        count
    }

    /// Ends the streak for `phase`.
    pub fn reset(&self, state: &mut PipelineState, phase: Phase) {
        state.set_meta(meta::consecutive_failures_key(phase), 0.into());
    }

    /// Returns true once the streak reaches the threshold.
    #[must_use]
    pub fn should_escalate(&self, state: &PipelineState, phase: Phase) -> bool {
        self.consecutive_failures(state, phase) >= self.threshold
    }

    /// Zeroes every phase's counter.
    pub fn reset_all(state: &mut PipelineState) {
        for (key, value) in &mut state.metadata {
            if key.ends_with(meta::CONSECUTIVE_FAILURES_SUFFIX) {
                *value = 0.into();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalates_after_threshold() {
        let breaker = CircuitBreaker::default();
        let mut state = PipelineState::new("anything");

        assert_eq!(breaker.record_failure(&mut state, Phase::Testing), 1);
        assert_eq!(breaker.record_failure(&mut state, Phase::Testing), 2);
        assert!(!breaker.should_escalate(&state, Phase::Testing));
        assert_eq!(breaker.record_failure(&mut state, Phase::Testing), 3);
        assert!(breaker.should_escalate(&state, Phase::Testing));
    }

    #[test]
    fn test_reset_clears_streak() {
        let breaker = CircuitBreaker::default();
        let mut state = PipelineState::new("anything");
        for _ in 0..3 {
            breaker.record_failure(&mut state, Phase::Planning);
        }
        breaker.reset(&mut state, Phase::Planning);
        assert!(!breaker.should_escalate(&state, Phase::Planning));
        assert_eq!(breaker.record_failure(&mut state, Phase::Planning), 1);
    }

    #[test]
    fn test_phases_are_independent() {
        let breaker = CircuitBreaker::new(1);
        let mut state = PipelineState::new("anything");
        breaker.record_failure(&mut state, Phase::Development);
        assert!(breaker.should_escalate(&state, Phase::Development));
        assert!(!breaker.should_escalate(&state, Phase::Deployment));
    }

    #[test]
    fn test_counter_stored_under_phase_key() {
        let breaker = CircuitBreaker::default();
        let mut state = PipelineState::new("anything");
        breaker.record_failure(&mut state, Phase::Deployment);
        assert_eq!(state.metadata["deployment_consecutive_failures"], 1);
    }

    #[test]
    fn test_reset_all() {
        let breaker = CircuitBreaker::default();
        let mut state = PipelineState::new("anything");
        breaker.record_failure(&mut state, Phase::Planning);
        breaker.record_failure(&mut state, Phase::Testing);
        state.set_meta("unrelated", 7.into());

        CircuitBreaker::reset_all(&mut state);
        assert_eq!(breaker.consecutive_failures(&state, Phase::Planning), 0);
        assert_eq!(breaker.consecutive_failures(&state, Phase::Testing), 0);
        assert_eq!(state.metadata["unrelated"], 7);
    }
}
