//! Parsed human decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a human asked the pipeline to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "text")]
pub enum FeedbackDecision {
    /// Resume at the staged phase with a fresh budget.
    Retry,
    /// End the run in `Error`.
    Abort,
    /// Accept the escalated phase as done and move on.
    Proceed,
    /// Resume at the staged phase with this text as feedback.
    Guidance(String),
}

impl FeedbackDecision {
    /// Parses a raw answer. Keywords are case-insensitive; any other text is
    /// guidance.
    #[must_use]
    pub fn parse(response: &str) -> Self {
        let trimmed = response.trim();
        match trimmed.to_lowercase().as_str() {
            "retry" => Self::Retry,
            "abort" | "cancel" | "stop" => Self::Abort,
            "proceed" | "continue" | "approve" | "skip" | "accept" => Self::Proceed,
            _ => Self::Guidance(trimmed.to_string()),
        }
    }

    /// Returns the decision name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Abort => "abort",
            Self::Proceed => "proceed",
            Self::Guidance(_) => "guidance",
        }
    }
}

impl fmt::Display for FeedbackDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
