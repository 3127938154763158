//! Input handed to a producer for one stage attempt.

use crate::core::Phase;
use crate::state::PipelineState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix prepended to guardrail feedback merged into the context.
pub(crate) const FEEDBACK_PREFIX: &str = "previous attempt failed because: ";

/// Everything a producer needs for one attempt of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageContext {
    /// Run the attempt belongs to.
    pub run_id: String,
    /// Stage being produced.
    pub stage: Phase,
    /// The user's request.
    pub input_description: String,
    /// Artifacts of earlier phases.
    pub artifacts: serde_json::Value,
    /// Feedback for this attempt, oldest first.
    pub feedback: Vec<String>,
    /// Last human response, if any.
    pub human_feedback: Option<String>,
    /// 1-based attempt number within the current guardrail loop.
    pub attempt: u32,
    /// Extra values a host wants to pass through.
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl StageContext {
    /// Creates a bare context.
    #[must_use]
    pub fn new(stage: Phase, input_description: impl Into<String>) -> Self {
        Self {
            stage,
            input_description: input_description.into(),
            artifacts: serde_json::json!({}),
            attempt: 1,
            ..Self::default()
        }
    }

    /// Builds the context for `stage` from the current state.
    ///
    /// Queued feedback is copied, not consumed. The caller drops it with
    /// [`PipelineState::take_feedback`] once the attempt has settled.
    #[must_use]
    pub fn from_state(state: &PipelineState, stage: Phase) -> Self {
        Self {
            run_id: state.run_id.clone(),
            stage,
            input_description: state.input_description.clone(),
            artifacts: state.artifacts.to_context_value(),
            feedback: state.pending_feedback(stage),
            human_feedback: state.human_feedback.clone(),
            attempt: 1,
            values: BTreeMap::new(),
        }
    }

    /// Adds a feedback line.
    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback.push(feedback.into());
        self
    }

    /// Sets an extra value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Reads an extra value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Merges a guardrail rejection into the feedback for the next attempt.
    pub fn add_guardrail_feedback(&mut self, feedback: &str) {
        self.feedback.push(format!("{FEEDBACK_PREFIX}{feedback}"));
    }

    /// Feedback joined into one prompt-ready block.
    #[must_use]
    pub fn feedback_text(&self) -> Option<String> {
        if self.feedback.is_empty() {
            None
        } else {
            Some(self.feedback.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_state_copies_queued_feedback() {
        let mut state = PipelineState::new("Build a CLI");
        state.push_feedback(Phase::Planning, "be specific");

        let ctx = StageContext::from_state(&state, Phase::Planning);
        assert_eq!(ctx.feedback, vec!["be specific".to_string()]);
        assert_eq!(ctx.input_description, "Build a CLI");
        assert_eq!(ctx.run_id, state.run_id);
        assert_eq!(state.pending_feedback(Phase::Planning), vec!["be specific".to_string()]);
    }

    #[test]
    fn test_guardrail_feedback_is_prefixed() {
        let mut ctx = StageContext::new(Phase::Development, "x");
        ctx.add_guardrail_feedback("missing tests");
        assert_eq!(
            ctx.feedback_text().unwrap(),
            "previous attempt failed because: missing tests"
        );
    }
}
