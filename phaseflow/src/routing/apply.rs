//! Applying a routing step to the state.

use super::step::NextStep;
use super::table::{next_step, RoutingConfig};
use crate::core::{Phase, StageOutcome, TestResult};
use crate::errors::{PhaseflowError, Result};
use crate::recovery::PhaseFailure;
use crate::state::{EscalationRequest, PipelineError, PipelineState};
use serde_json::json;
use tracing::{debug, info, warn};

const INSUFFICIENT_ARCHITECTURE_FEEDBACK: &str =
    "The development stage could not build on the architecture. Make it concrete enough to implement.";

/// Picks the next step for the current phase and applies it.
///
/// Returns the step together with the failure to hand to recovery, if the
/// step is an `_error` route.
pub fn route(
    outcome: &StageOutcome,
    state: &mut PipelineState,
    config: &RoutingConfig,
) -> Result<(NextStep, Option<PhaseFailure>)> {
    let phase = state.current_phase;
    let step = next_step(phase, outcome, state, config);
    let failure = apply(step, outcome, state)?;
    Ok((step, failure))
}

/// Performs the mutation `step` implies for an outcome of the current phase.
///
/// `_error` steps leave the state untouched and return the
/// [`PhaseFailure`] recovery should handle.
pub fn apply(
    step: NextStep,
    outcome: &StageOutcome,
    state: &mut PipelineState,
) -> Result<Option<PhaseFailure>> {
    let phase = state.current_phase;
    debug!(run_id = %state.run_id, phase = %phase, step = %step, "Applying routing step");

    match step {
        NextStep::Planning
        | NextStep::Development
        | NextStep::Testing
        | NextStep::Deployment
        | NextStep::Finalize => {
            let target = step
                .target_phase()
                .ok_or_else(|| PhaseflowError::InvalidState(format!("{step} has no target")))?;
            store_artifacts(phase, outcome, state);
            state.resolve_errors(phase);
            state.transition_to(target, format!("{phase} succeeded"))?;
            Ok(None)
        }
        NextStep::HumanFeedback => {
            escalate_for_input(phase, outcome, state)?;
            Ok(None)
        }
        NextStep::Fatal => {
            let message = outcome
                .failure_message(phase)
                .unwrap_or_else(|| format!("{phase} stage returned no status"));
            warn!(run_id = %state.run_id, phase = %phase, error = %message, "Fatal stage outcome");
            state.record_error(PipelineError::new(phase, "fatal", &message, false));
            state.transition_to(Phase::Error, message)?;
            Ok(None)
        }
        NextStep::PlanningError
        | NextStep::DevelopmentError
        | NextStep::TestingError
        | NextStep::DeploymentError => Ok(Some(failure_for(phase, outcome))),
        NextStep::RollbackToPlanning => {
            rollback_to_planning(outcome, state)?;
            Ok(None)
        }
        NextStep::RetryDevelopment => {
            retry_development(outcome, state)?;
            Ok(None)
        }
        NextStep::EscalateToHuman => {
            escalate_test_failures(outcome, state)?;
            Ok(None)
        }
    }
}

fn store_artifacts(phase: Phase, outcome: &StageOutcome, state: &mut PipelineState) {
    let artifacts = &mut state.artifacts;
    match phase {
        Phase::Planning => {
            artifacts.requirements.clone_from(&outcome.requirements);
            artifacts.architecture.clone_from(&outcome.architecture);
        }
        Phase::Development => artifacts.generated_files = Some(outcome.files.clone()),
        Phase::Testing => {
            if outcome.test_result.is_some() {
                artifacts.test_result.clone_from(&outcome.test_result);
            }
        }
        Phase::Deployment => artifacts.deployment_config.clone_from(&outcome.deployment_config),
        _ => {}
    }
}

fn failure_for(phase: Phase, outcome: &StageOutcome) -> PhaseFailure {
    if let Some(message) = outcome.failure_message(phase) {
        return PhaseFailure::new(phase, message);
    }
    match phase {
        Phase::Planning => {
            let mut missing = Vec::new();
            if !outcome.requirements.as_ref().is_some_and(|r| r.is_complete()) {
                missing.push("requirements");
            }
            if !outcome.architecture.as_ref().is_some_and(|a| a.is_complete()) {
                missing.push("architecture");
            }
            PhaseFailure::new(
                phase,
                format!(
                    "planning output is structurally incomplete: missing {}",
                    missing.join(" and ")
                ),
            )
        }
        Phase::Development if outcome.files.is_empty() => {
            PhaseFailure::new(phase, "development produced no files")
        }
        _ => PhaseFailure::unexplained(phase),
    }
}

fn escalate_for_input(
    phase: Phase,
    outcome: &StageOutcome,
    state: &mut PipelineState,
) -> Result<()> {
    let request = if phase == Phase::Planning {
        state.artifacts.requirements.clone_from(&outcome.requirements);
        state.artifacts.architecture.clone_from(&outcome.architecture);
        let confidence = outcome.effective_confidence();
        let question = if outcome.clarification_questions.is_empty() {
            format!(
                "Planning confidence is {confidence:.2}. Clarify the request, proceed with the current plan, or abort?"
            )
        } else {
            format!(
                "Planning needs clarification:\n- {}",
                outcome.clarification_questions.join("\n- ")
            )
        };
        EscalationRequest::new(phase, "needs_clarification", question).with_context(json!({
            "confidence": confidence,
            "clarification_questions": outcome.clarification_questions,
        }))
    } else {
        let reason = outcome
            .error
            .clone()
            .unwrap_or_else(|| "the input was rejected".to_string());
        EscalationRequest::new(
            phase,
            "invalid_input",
            format!("The request was rejected: {reason}. Provide a corrected description, or abort?"),
        )
        .with_context(json!({ "input_description": state.input_description }))
    };
    info!(run_id = %state.run_id, phase = %phase, reason = %request.reason, "Asking for human input");
    state.escalate(&request)
}

fn rollback_to_planning(outcome: &StageOutcome, state: &mut PipelineState) -> Result<()> {
    if !state.can_retry(Phase::Planning) {
        let request = EscalationRequest::new(
            Phase::Development,
            "max_retries_exceeded",
            "Development keeps rejecting the architecture. Retry planning, proceed anyway, or abort?",
        )
        .with_resume_to(Phase::Planning);
        store_artifacts(Phase::Development, outcome, state);
        return state.escalate(&request);
    }
    state.increment_retry(Phase::Planning)?;
    let feedback = outcome
        .feedback
        .clone()
        .unwrap_or_else(|| INSUFFICIENT_ARCHITECTURE_FEEDBACK.to_string());
    state.push_feedback(Phase::Planning, feedback);
    if state.rollback_last_phase() != Some(Phase::Planning) {
        return Err(PhaseflowError::InvalidState(
            "rollback to planning did not land on planning".to_string(),
        ));
    }
    info!(run_id = %state.run_id, "Rolled back to planning");
    Ok(())
}

fn test_feedback(outcome: &StageOutcome) -> String {
    if let Some(feedback) = outcome.feedback.as_ref().filter(|f| !f.trim().is_empty()) {
        return feedback.clone();
    }
    match &outcome.test_result {
        Some(TestResult {
            passed, failed, failures, ..
        }) => {
            let mut text = format!("{failed} of {} tests failed.", passed + failed);
            for failure in failures {
                text.push_str("\n- ");
                text.push_str(failure);
            }
            text
        }
        None => "Tests failed. Fix the generated code.".to_string(),
    }
}

fn retry_development(outcome: &StageOutcome, state: &mut PipelineState) -> Result<()> {
    let count = state.increment_retry(Phase::Testing)?;
    if outcome.test_result.is_some() {
        state.artifacts.test_result.clone_from(&outcome.test_result);
    }
    state.push_feedback(Phase::Development, test_feedback(outcome));
    if state.rollback_last_phase() != Some(Phase::Development) {
        return Err(PhaseflowError::InvalidState(
            "retry_development did not land on development".to_string(),
        ));
    }
    info!(
        run_id = %state.run_id,
        retry = count,
        max_retries = state.max_retries,
        "Tests failed, retrying development"
    );
    Ok(())
}

fn escalate_test_failures(outcome: &StageOutcome, state: &mut PipelineState) -> Result<()> {
    if outcome.test_result.is_some() {
        state.artifacts.test_result.clone_from(&outcome.test_result);
    }
    let reason = if outcome.critical_failures {
        "critical_failures"
    } else {
        "max_retries_exceeded"
    };
    let question = format!(
        "Tests failed ({reason}) after {} development retries:\n{}\nRetry development, proceed to deployment, or abort?",
        state.retry_count(Phase::Testing),
        test_feedback(outcome)
    );
    let request = EscalationRequest::new(Phase::Testing, reason, question)
        .with_resume_to(Phase::Development)
        .with_context(json!({
            "test_result": outcome.test_result,
            "retry_count": state.retry_count(Phase::Testing),
            "max_retries": state.max_retries,
        }));
    warn!(run_id = %state.run_id, reason, "Escalating test failures");
    state.escalate(&request)
}
