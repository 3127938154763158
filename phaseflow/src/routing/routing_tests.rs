//! Tests for routing and step application.

#[cfg(test)]
mod tests {
    use crate::routing::{route, NextStep, RoutingConfig};
    use crate::core::{OutcomeStatus, Phase, StageOutcome};
    use crate::state::{meta, EscalationRequest, PipelineState};
    use crate::testing::{
        assert_history_valid, assert_phase, development_success_output, planning_success_output,
        tests_failed_output,
    };
    use pretty_assertions::assert_eq;

    fn state_at(phase: Phase, max_retries: u32) -> PipelineState {
        let mut state = PipelineState::new("Build a todo REST API").with_max_retries(max_retries);
        while state.current_phase != phase {
            state.advance("test setup").unwrap();
        }
        state
    }

    #[test]
    fn test_scenario_a_retry_then_escalate() {
        let config = RoutingConfig::default();
        let mut state = state_at(Phase::Testing, 1);
        let failed = StageOutcome::from_output(&tests_failed_output(false));

        let (step, failure) = route(&failed, &mut state, &config).unwrap();
        assert_eq!(step, NextStep::RetryDevelopment);
        assert!(failure.is_none());
        assert_eq!(state.retry_count(Phase::Testing), 1);
        assert_phase(&state, Phase::Development);
        assert_eq!(state.pending_feedback(Phase::Development).len(), 1);
        assert!(state.pending_feedback(Phase::Development)[0].contains("2 tests failed"));

        state.advance("development succeeded").unwrap();
        let (step, _) = route(&failed, &mut state, &config).unwrap();
        assert_eq!(step, NextStep::EscalateToHuman);
        assert_phase(&state, Phase::AwaitingHuman);
        assert!(state.awaiting_human_input);
        assert_eq!(state.retry_count(Phase::Testing), 1);
        assert_history_valid(&state);

        let request = EscalationRequest::read_from(&state.metadata).unwrap();
        assert_eq!(request.phase, Phase::Testing);
        assert_eq!(request.reason, "max_retries_exceeded");
        assert_eq!(request.resume_to, Phase::Development);
        assert_eq!(state.meta_str(meta::FEEDBACK_DEFAULT_OPTION), Some("abort"));
    }

    #[test]
    fn test_critical_failures_escalate_immediately() {
        let mut state = state_at(Phase::Testing, 3);
        let failed = StageOutcome::from_output(&tests_failed_output(true));

        let (step, _) = route(&failed, &mut state, &RoutingConfig::default()).unwrap();
        assert_eq!(step, NextStep::EscalateToHuman);
        assert_eq!(state.retry_count(Phase::Testing), 0);
        assert_eq!(state.meta_str(meta::ESCALATION_REASON), Some("critical_failures"));
        assert!(state.artifacts.test_result.is_some());
    }

    #[test]
    fn test_scenario_c_confident_plan_advances() {
        let mut state = state_at(Phase::Planning, 3);
        let outcome = StageOutcome::from_output(&planning_success_output(0.9));

        let (step, failure) = route(&outcome, &mut state, &RoutingConfig::default()).unwrap();
        assert_eq!(step, NextStep::Development);
        assert!(failure.is_none());
        assert_phase(&state, Phase::Development);
        assert!(state.artifacts.requirements.is_some());
        assert!(state.artifacts.architecture.is_some());
    }

    #[test]
    fn test_low_confidence_asks_human_and_keeps_plan() {
        let mut state = state_at(Phase::Planning, 3);
        let outcome = StageOutcome::from_output(&planning_success_output(0.4));

        let (step, _) = route(&outcome, &mut state, &RoutingConfig::default()).unwrap();
        assert_eq!(step, NextStep::HumanFeedback);
        assert_phase(&state, Phase::AwaitingHuman);
        assert_eq!(state.meta_str(meta::ESCALATION_REASON), Some("needs_clarification"));
        assert_eq!(state.meta_str(meta::FEEDBACK_RESUME_TO), Some("planning"));
        assert!(state.artifacts.architecture.is_some());
    }

    #[test]
    fn test_advance_resolves_earlier_errors() {
        let mut state = state_at(Phase::Development, 3);
        state.record_error(crate::state::PipelineError::new(
            Phase::Development,
            "recoverable",
            "development produced no files",
            true,
        ));
        let outcome = StageOutcome::from_output(&development_success_output());

        let (step, _) = route(&outcome, &mut state, &RoutingConfig::default()).unwrap();
        assert_eq!(step, NextStep::Testing);
        assert_eq!(state.unresolved_errors().count(), 0);
        assert_eq!(state.artifacts.generated_files.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_error_route_returns_failure_without_mutation() {
        let mut state = state_at(Phase::Deployment, 3);
        let before = state.clone();

        let (step, failure) =
            route(&StageOutcome::failed("503 Service Unavailable"), &mut state, &RoutingConfig::default())
                .unwrap();
        assert_eq!(step, NextStep::DeploymentError);
        let failure = failure.unwrap();
        assert_eq!(failure.phase, Phase::Deployment);
        assert_eq!(failure.message.as_deref(), Some("503 Service Unavailable"));
        assert_eq!(state, before);
    }

    #[test]
    fn test_incomplete_plan_failure_message() {
        let mut state = state_at(Phase::Planning, 3);
        let (step, failure) =
            route(&StageOutcome::success(), &mut state, &RoutingConfig::default()).unwrap();
        assert_eq!(step, NextStep::PlanningError);
        assert_eq!(
            failure.unwrap().message.as_deref(),
            Some("planning output is structurally incomplete: missing requirements and architecture")
        );
    }

    #[test]
    fn test_rollback_to_planning() {
        let mut state = state_at(Phase::Development, 3);
        let mut outcome = StageOutcome::from_output(&development_success_output());
        outcome.insufficient_architecture = true;
        outcome.feedback = Some("No persistence layer described".to_string());

        let (step, _) = route(&outcome, &mut state, &RoutingConfig::default()).unwrap();
        assert_eq!(step, NextStep::RollbackToPlanning);
        assert_phase(&state, Phase::Planning);
        assert_eq!(
            state.pending_feedback(Phase::Planning),
            vec!["No persistence layer described".to_string()]
        );
        assert_history_valid(&state);
    }

    #[test]
    fn test_rollback_budget_spent_escalates() {
        let mut state = state_at(Phase::Development, 0);
        let mut outcome = StageOutcome::from_output(&development_success_output());
        outcome.insufficient_architecture = true;

        route(&outcome, &mut state, &RoutingConfig::default()).unwrap();
        assert_phase(&state, Phase::AwaitingHuman);
        assert_eq!(state.meta_str(meta::FEEDBACK_RESUME_TO), Some("planning"));
        assert_eq!(state.artifacts.generated_files.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_intake_invalid_and_fatal() {
        let mut state = state_at(Phase::Intake, 3);
        route(&StageOutcome::invalid("input too short"), &mut state, &RoutingConfig::default())
            .unwrap();
        assert_phase(&state, Phase::AwaitingHuman);
        assert_eq!(state.meta_str(meta::ESCALATION_REASON), Some("invalid_input"));

        let mut state = state_at(Phase::Intake, 3);
        let (step, _) = route(
            &StageOutcome::new(OutcomeStatus::Other("maybe".to_string())),
            &mut state,
            &RoutingConfig::default(),
        )
        .unwrap();
        assert_eq!(step, NextStep::Fatal);
        assert_phase(&state, Phase::Error);
        assert_eq!(state.errors.len(), 1);
        assert!(!state.errors[0].recoverable);
        assert_eq!(state.exit_code(), 1);
    }

    #[test]
    fn test_finalize_completes_run() {
        let mut state = state_at(Phase::Deployment, 3);
        let (step, _) =
            route(&StageOutcome::success(), &mut state, &RoutingConfig::default()).unwrap();
        assert_eq!(step, NextStep::Finalize);
        assert_phase(&state, Phase::Complete);
        assert!(state.completed_at.is_some());
        assert_eq!(state.exit_code(), 0);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(NextStep::RetryDevelopment.as_str(), "retry_development");
        assert_eq!(NextStep::EscalateToHuman.to_string(), "escalate_to_human");
        assert_eq!(NextStep::error_for(Phase::Testing), Some(NextStep::TestingError));
        assert_eq!(NextStep::error_for(Phase::Intake), None);
        assert!(NextStep::Finalize.is_advance());
        assert!(NextStep::PlanningError.is_error());
    }
}
