//! Tests for the pipeline state invariants.

#[cfg(test)]
mod tests {
    use crate::core::Phase;
    use crate::errors::PhaseflowError;
    use crate::state::{meta, EscalationRequest, PipelineError, PipelineState};
    use pretty_assertions::assert_eq;

    fn state_at(phase: Phase) -> PipelineState {
        let mut state = PipelineState::new("Build a todo API with auth");
        while state.current_phase != phase {
            state.advance("test setup").unwrap();
        }
        state
    }

    #[test]
    fn test_new_state_starts_at_intake() {
        let state = PipelineState::new("anything");
        assert_eq!(state.current_phase, Phase::Intake);
        assert!(state.phase_history.is_empty());
        assert_eq!(state.max_retries, 3);
        assert!(!state.run_id.is_empty());
        assert!(state.validate_history().is_ok());
    }

    #[test]
    fn test_forward_walk_to_complete() {
        let mut state = state_at(Phase::Complete);
        assert_eq!(state.phase_history.len(), 5);
        assert!(state.completed_at.is_some());
        assert!(state.validate_history().is_ok());
        assert!(state.is_terminal());
        assert_eq!(state.exit_code(), 0);

        let err = state.advance("past the end").unwrap_err();
        assert!(matches!(err, PhaseflowError::InvalidTransition { .. }));
    }

    #[test]
    fn test_skipping_a_phase_is_rejected_and_state_untouched() {
        let mut state = PipelineState::new("anything");
        let err = state
            .transition_to(Phase::Testing, "skip ahead")
            .unwrap_err();
        assert!(matches!(
            err,
            PhaseflowError::InvalidTransition {
                from: Phase::Intake,
                to: Phase::Testing,
                ..
            }
        ));
        assert_eq!(state.current_phase, Phase::Intake);
        assert!(state.phase_history.is_empty());
    }

    #[test]
    fn test_side_states_reachable_from_every_phase() {
        for phase in Phase::ORDERED {
            let mut state = state_at(phase);
            state.transition_to(Phase::AwaitingHuman, "pause").unwrap();
            assert_eq!(state.current_phase, Phase::AwaitingHuman);

            let mut state = state_at(phase);
            state.transition_to(Phase::Error, "fail").unwrap();
            assert_eq!(state.current_phase, Phase::Error);
            assert!(state.validate_history().is_ok());
        }
    }

    #[test]
    fn test_increment_retry_fails_loudly_past_limit() {
        let mut state = PipelineState::new("anything").with_max_retries(2);
        assert_eq!(state.increment_retry(Phase::Testing).unwrap(), 1);
        assert_eq!(state.increment_retry(Phase::Testing).unwrap(), 2);

        let err = state.increment_retry(Phase::Testing).unwrap_err();
        assert!(matches!(
            err,
            PhaseflowError::RetryLimitExceeded {
                phase: Phase::Testing,
                count: 2,
                max_retries: 2,
            }
        ));
        assert_eq!(state.retry_count(Phase::Testing), 2);
        assert_eq!(state.retry_count(Phase::Development), 0);
    }

    #[test]
    fn test_zero_max_retries_rejects_first_increment() {
        let mut state = PipelineState::new("anything").with_max_retries(0);
        assert!(!state.can_retry(Phase::Planning));
        assert!(state.increment_retry(Phase::Planning).is_err());
    }

    #[test]
    fn test_rollback_restores_previous_phase() {
        let mut state = state_at(Phase::Development);
        assert_eq!(state.rollback_last_phase(), Some(Phase::Planning));
        assert_eq!(state.current_phase, Phase::Planning);
        assert_eq!(state.phase_history.len(), 1);
        assert!(state.validate_history().is_ok());

        let mut fresh = PipelineState::new("anything");
        assert_eq!(fresh.rollback_last_phase(), None);
        assert_eq!(fresh.current_phase, Phase::Intake);
    }

    #[test]
    fn test_rollback_from_complete_clears_completion() {
        let mut state = state_at(Phase::Complete);
        state.rollback_last_phase();
        assert!(state.completed_at.is_none());
        assert_eq!(state.current_phase, Phase::Deployment);
    }

    #[test]
    fn test_rewind_to_earlier_phase() {
        let mut state = state_at(Phase::Testing);
        state.transition_to(Phase::AwaitingHuman, "pause").unwrap();

        assert_eq!(state.rewind_to(Phase::Development).unwrap(), 2);
        assert_eq!(state.current_phase, Phase::Development);
        assert!(state.validate_history().is_ok());

        let err = state.rewind_to(Phase::Deployment).unwrap_err();
        assert!(matches!(err, PhaseflowError::InvalidTransition { .. }));
        assert_eq!(state.current_phase, Phase::Development);
    }

    #[test]
    fn test_validate_history_detects_tampering() {
        let mut state = state_at(Phase::Planning);
        state.current_phase = Phase::Testing;
        assert!(matches!(
            state.validate_history(),
            Err(PhaseflowError::InvalidState(_))
        ));

        let mut state = state_at(Phase::Development);
        state.phase_history[1].to_phase = Phase::Deployment;
        state.current_phase = Phase::Deployment;
        assert!(state.validate_history().is_err());
    }

    #[test]
    fn test_pending_feedback_is_consumed_once() {
        let mut state = PipelineState::new("anything");
        state.push_feedback(Phase::Development, "tests failed: test_login");
        state.push_feedback(Phase::Development, "missing README");
        state.push_feedback(Phase::Planning, "clarify auth");

        assert_eq!(state.pending_feedback(Phase::Development).len(), 2);
        let taken = state.take_feedback(Phase::Development);
        assert_eq!(
            taken,
            vec!["tests failed: test_login".to_string(), "missing README".to_string()]
        );
        assert!(state.take_feedback(Phase::Development).is_empty());
        assert_eq!(state.pending_feedback(Phase::Planning), vec!["clarify auth".to_string()]);
    }

    #[test]
    fn test_escalate_stages_question_and_pauses() {
        let mut state = state_at(Phase::Testing);
        let request = EscalationRequest::new(Phase::Testing, "critical_failures", "Tests failed")
            .with_resume_to(Phase::Development);
        state.escalate(&request).unwrap();

        assert!(state.awaiting_human_input);
        assert_eq!(state.current_phase, Phase::AwaitingHuman);
        assert_eq!(state.meta_str(meta::FEEDBACK_QUESTION), Some("Tests failed"));
        assert_eq!(state.meta_str(meta::FEEDBACK_RESUME_TO), Some("development"));
        assert_eq!(state.exit_code(), 2);
    }

    #[test]
    fn test_finish_escalation_clears_staged_question() {
        let mut state = state_at(Phase::Testing);
        state
            .escalate(&EscalationRequest::new(Phase::Testing, "critical_failures", "Tests failed"))
            .unwrap();
        state.rewind_to(Phase::Testing).unwrap();
        assert_eq!(state.meta_str(meta::FEEDBACK_QUESTION), Some("Tests failed"));

        state.finish_escalation();
        assert!(!state.awaiting_human_input);
        assert!(EscalationRequest::read_from(&state.metadata).is_none());
    }

    #[test]
    fn test_unresolved_errors_affect_exit_code() {
        let mut state = state_at(Phase::Deployment);
        state.record_error(PipelineError::new(
            Phase::Deployment,
            "retryable",
            "503",
            true,
        ));
        state.advance("done").unwrap();
        assert_eq!(state.exit_code(), 1);

        state.resolve_errors(Phase::Deployment);
        assert_eq!(state.exit_code(), 0);
    }

    #[test]
    fn test_serde_round_trip_preserves_state() {
        let mut state = state_at(Phase::Testing);
        state.increment_retry(Phase::Testing).unwrap();
        state.record_error(PipelineError::new(Phase::Testing, "recoverable", "bad", true));
        state.push_feedback(Phase::Development, "fix it");

        let json = serde_json::to_string_pretty(&state).unwrap();
        assert!(json.contains(r#""testing": 1"#));
        let restored: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
