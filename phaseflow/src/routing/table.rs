//! The pure routing table.

use super::step::NextStep;
use crate::core::{OutcomeStatus, Phase, StageOutcome};
use crate::state::PipelineState;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default planning confidence below which a human is asked.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

/// Tunables of the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Planning confidence below which a human is asked.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Picks the next step for an outcome of `phase`. Never mutates.
#[must_use]
pub fn next_step(
    phase: Phase,
    outcome: &StageOutcome,
    state: &PipelineState,
    config: &RoutingConfig,
) -> NextStep {
    let step = match phase {
        Phase::Intake => route_after_intake(outcome),
        Phase::Planning => route_after_planning(outcome, config),
        Phase::Development => route_after_development(outcome),
        Phase::Testing => route_after_testing(outcome, state),
        Phase::Deployment => route_after_deployment(outcome),
        Phase::Complete | Phase::Error | Phase::AwaitingHuman => NextStep::Fatal,
    };
    debug!(phase = %phase, step = %step, status = ?outcome.status, "Routed stage outcome");
    step
}

/// Intake: success advances, invalid input asks a human, anything else is
/// fatal.
#[must_use]
pub fn route_after_intake(outcome: &StageOutcome) -> NextStep {
    if outcome.is_success() {
        NextStep::Planning
    } else if outcome.has_status(&OutcomeStatus::Invalid) {
        NextStep::HumanFeedback
    } else {
        NextStep::Fatal
    }
}

/// Planning: asks a human when unsure, fails on an incomplete plan.
#[must_use]
pub fn route_after_planning(outcome: &StageOutcome, config: &RoutingConfig) -> NextStep {
    if !outcome.is_success() {
        return NextStep::PlanningError;
    }
    if outcome.needs_clarification || outcome.effective_confidence() < config.confidence_threshold
    {
        return NextStep::HumanFeedback;
    }
    let complete = outcome.requirements.as_ref().is_some_and(|r| r.is_complete())
        && outcome.architecture.as_ref().is_some_and(|a| a.is_complete());
    if complete {
        NextStep::Development
    } else {
        NextStep::PlanningError
    }
}

/// Development: can send the run back to Planning; must produce files.
#[must_use]
pub fn route_after_development(outcome: &StageOutcome) -> NextStep {
    if !outcome.is_success() {
        NextStep::DevelopmentError
    } else if outcome.insufficient_architecture {
        NextStep::RollbackToPlanning
    } else if outcome.files.is_empty() {
        NextStep::DevelopmentError
    } else {
        NextStep::Testing
    }
}

/// Testing: failing tests go back to Development until the Testing retry
/// budget is spent or a failure is critical.
#[must_use]
pub fn route_after_testing(outcome: &StageOutcome, state: &PipelineState) -> NextStep {
    if outcome.is_success() {
        NextStep::Deployment
    } else if outcome.has_status(&OutcomeStatus::Error) {
        NextStep::TestingError
    } else if outcome.critical_failures || !state.can_retry(Phase::Testing) {
        NextStep::EscalateToHuman
    } else {
        NextStep::RetryDevelopment
    }
}

/// Deployment: success finishes the run.
#[must_use]
pub fn route_after_deployment(outcome: &StageOutcome) -> NextStep {
    if outcome.is_success() {
        NextStep::Finalize
    } else {
        NextStep::DeploymentError
    }
}
