//! Structured stage outcome consumed by the routing engine.

use super::{
    Architecture, DeploymentConfig, GeneratedFile, OutcomeStatus, Phase, Requirements,
    StageOutput, TestResult,
};

/// Well-known data keys a producer may set on its output.
pub mod keys {
    /// Planning: the producer wants a human to clarify the input.
    pub const NEEDS_CLARIFICATION: &str = "needs_clarification";
    /// Planning: confidence in the plan, 0.0 to 1.0.
    pub const CONFIDENCE: &str = "confidence";
    /// Planning: questions to put to the human.
    pub const CLARIFICATION_QUESTIONS: &str = "clarification_questions";
    /// Development: the architecture was not enough to build on.
    pub const INSUFFICIENT_ARCHITECTURE: &str = "insufficient_architecture";
    /// Testing: failures that must go to a human.
    pub const CRITICAL_FAILURES: &str = "critical_failures";
    /// Any stage: feedback to hand to the next attempt.
    pub const FEEDBACK: &str = "feedback";
    /// Planning artifact.
    pub const REQUIREMENTS: &str = "requirements";
    /// Planning artifact.
    pub const ARCHITECTURE: &str = "architecture";
    /// Development artifact.
    pub const FILES: &str = "files";
    /// Testing artifact.
    pub const TEST_RESULT: &str = "test_result";
    /// Deployment artifact.
    pub const DEPLOYMENT_CONFIG: &str = "deployment_config";
}

/// The routed view of one stage result.
///
/// Built from a [`StageOutput`] by parsing the well-known [`keys`]. Fields
/// that are present but do not match their schema are left empty and
/// reported in `parse_errors`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    /// Result status.
    pub status: Option<OutcomeStatus>,
    /// Error text for failed outcomes.
    pub error: Option<String>,
    /// Planning asked for clarification.
    pub needs_clarification: bool,
    /// Planning confidence, if reported.
    pub confidence: Option<f64>,
    /// Questions for the human.
    pub clarification_questions: Vec<String>,
    /// Development found the architecture insufficient.
    pub insufficient_architecture: bool,
    /// Testing reported critical failures.
    pub critical_failures: bool,
    /// Feedback for the next attempt.
    pub feedback: Option<String>,
    /// Parsed requirements.
    pub requirements: Option<Requirements>,
    /// Parsed architecture.
    pub architecture: Option<Architecture>,
    /// Parsed generated files.
    pub files: Vec<GeneratedFile>,
    /// Parsed test result.
    pub test_result: Option<TestResult>,
    /// Parsed deployment configuration.
    pub deployment_config: Option<DeploymentConfig>,
    /// Schema mismatches found while parsing.
    pub parse_errors: Vec<String>,
}

impl StageOutcome {
    /// Creates an outcome with the given status.
    #[must_use]
    pub fn new(status: impl Into<OutcomeStatus>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    /// Creates a successful outcome.
    #[must_use]
    pub fn success() -> Self {
        Self::new(OutcomeStatus::Success)
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(OutcomeStatus::Error)
        }
    }

    /// Creates an outcome for rejected input.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(OutcomeStatus::Invalid)
        }
    }

    /// Parses a producer output.
    #[must_use]
    pub fn from_output(output: &StageOutput) -> Self {
        let mut outcome = Self {
            status: Some(output.status.clone()),
            error: output.error.clone(),
            needs_clarification: output.flag(keys::NEEDS_CLARIFICATION),
            confidence: output.get(keys::CONFIDENCE).and_then(serde_json::Value::as_f64),
            insufficient_architecture: output.flag(keys::INSUFFICIENT_ARCHITECTURE),
            critical_failures: output.flag(keys::CRITICAL_FAILURES),
            feedback: output
                .get(keys::FEEDBACK)
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            ..Self::default()
        };

        let mut errors = Vec::new();
        outcome.clarification_questions =
            parse_field(output, keys::CLARIFICATION_QUESTIONS, &mut errors).unwrap_or_default();
        outcome.requirements = parse_field(output, keys::REQUIREMENTS, &mut errors);
        outcome.architecture = parse_field(output, keys::ARCHITECTURE, &mut errors);
        outcome.files = parse_field(output, keys::FILES, &mut errors).unwrap_or_default();
        outcome.test_result = parse_field(output, keys::TEST_RESULT, &mut errors);
        outcome.deployment_config = parse_field(output, keys::DEPLOYMENT_CONFIG, &mut errors);
        outcome.parse_errors = errors;

        if let Some(result) = &outcome.test_result {
            outcome.critical_failures |= result.critical_failures;
        }
        outcome
    }

    /// Returns true if the status is success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.as_ref().is_some_and(OutcomeStatus::is_success)
    }

    /// Returns true if the status is exactly `status`.
    #[must_use]
    pub fn has_status(&self, status: &OutcomeStatus) -> bool {
        self.status.as_ref() == Some(status)
    }

    /// Planning confidence with the documented default.
    ///
    /// Absent confidence counts as 0.0 when clarification was requested and
    /// 1.0 otherwise.
    #[must_use]
    pub fn effective_confidence(&self) -> f64 {
        self.confidence
            .unwrap_or(if self.needs_clarification { 0.0 } else { 1.0 })
    }

    /// Text describing why this outcome failed, for classification.
    #[must_use]
    pub fn failure_message(&self, phase: Phase) -> Option<String> {
        if let Some(error) = self.error.as_ref().filter(|e| !e.trim().is_empty()) {
            return Some(error.clone());
        }
        if !self.parse_errors.is_empty() {
            return Some(format!(
                "could not parse expected schema: {}",
                self.parse_errors.join("; ")
            ));
        }
        match &self.status {
            Some(status) if !status.is_success() => {
                Some(format!("{phase} stage returned status '{status}'"))
            }
            _ => None,
        }
    }

    /// Sets the error text.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Sets the confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Marks the outcome as needing clarification.
    #[must_use]
    pub fn with_clarification(mut self, questions: Vec<String>) -> Self {
        self.needs_clarification = true;
        self.clarification_questions = questions;
        self
    }

    /// Sets the planning artifacts.
    #[must_use]
    pub fn with_plan(mut self, requirements: Requirements, architecture: Architecture) -> Self {
        self.requirements = Some(requirements);
        self.architecture = Some(architecture);
        self
    }

    /// Sets the generated files.
    #[must_use]
    pub fn with_files(mut self, files: Vec<GeneratedFile>) -> Self {
        self.files = files;
        self
    }

    /// Sets the test result, picking up its critical flag.
    #[must_use]
    pub fn with_test_result(mut self, result: TestResult) -> Self {
        self.critical_failures |= result.critical_failures;
        self.test_result = Some(result);
        self
    }

    /// Sets the feedback.
    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

fn parse_field<T: serde::de::DeserializeOwned>(
    output: &StageOutput,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    match output.get_as::<T>(key)? {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(format!("{key}: {e}"));
            None
        }
    }
}
