//! Step identifiers.

use crate::core::Phase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the pipeline goes after a stage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    /// Advance to Planning.
    Planning,
    /// Advance to Development.
    Development,
    /// Advance to Testing.
    Testing,
    /// Advance to Deployment.
    Deployment,
    /// Advance to Complete.
    Finalize,
    /// Ask a human before going on.
    HumanFeedback,
    /// End the run in Error.
    Fatal,
    /// Planning failed.
    PlanningError,
    /// Development failed.
    DevelopmentError,
    /// Testing failed to run.
    TestingError,
    /// Deployment failed.
    DeploymentError,
    /// Development found the plan insufficient.
    RollbackToPlanning,
    /// Tests failed; send their feedback back to Development.
    RetryDevelopment,
    /// Tests failed and no retry is possible.
    EscalateToHuman,
}

impl NextStep {
    /// Returns the step name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Deployment => "deployment",
            Self::Finalize => "finalize",
            Self::HumanFeedback => "human_feedback",
            Self::Fatal => "fatal",
            Self::PlanningError => "planning_error",
            Self::DevelopmentError => "development_error",
            Self::TestingError => "testing_error",
            Self::DeploymentError => "deployment_error",
            Self::RollbackToPlanning => "rollback_to_planning",
            Self::RetryDevelopment => "retry_development",
            Self::EscalateToHuman => "escalate_to_human",
        }
    }

    /// The phase an advancing step moves to.
    #[must_use]
    pub fn target_phase(&self) -> Option<Phase> {
        match self {
            Self::Planning => Some(Phase::Planning),
            Self::Development => Some(Phase::Development),
            Self::Testing => Some(Phase::Testing),
            Self::Deployment => Some(Phase::Deployment),
            Self::Finalize => Some(Phase::Complete),
            _ => None,
        }
    }

    /// The failing phase of an `_error` step.
    #[must_use]
    pub fn error_phase(&self) -> Option<Phase> {
        match self {
            Self::PlanningError => Some(Phase::Planning),
            Self::DevelopmentError => Some(Phase::Development),
            Self::TestingError => Some(Phase::Testing),
            Self::DeploymentError => Some(Phase::Deployment),
            _ => None,
        }
    }

    /// Returns true for steps that advance one phase.
    #[must_use]
    pub fn is_advance(&self) -> bool {
        self.target_phase().is_some()
    }

    /// Returns true for `_error` steps.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_phase().is_some()
    }

    /// The error step for a stage phase.
    #[must_use]
    pub fn error_for(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Planning => Some(Self::PlanningError),
            Phase::Development => Some(Self::DevelopmentError),
            Phase::Testing => Some(Self::TestingError),
            Phase::Deployment => Some(Self::DeploymentError),
            _ => None,
        }
    }
}

impl fmt::Display for NextStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
