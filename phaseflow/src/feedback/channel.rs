//! The channel a human answers through.

use crate::core::Phase;
use crate::state::EscalationRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A question put to a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    /// Request id, used to answer through [`super::PendingFeedbackChannel`].
    pub id: Uuid,
    /// Run that is waiting.
    pub run_id: String,
    /// Phase that escalated.
    pub phase: Phase,
    /// Machine-readable escalation reason.
    pub reason: String,
    /// The question.
    pub question: String,
    /// Whatever helps the human decide.
    pub context: serde_json::Value,
    /// Allowed answers.
    pub options: Vec<String>,
    /// Answer used on timeout.
    pub default_option: String,
    /// How long the gate waits.
    pub timeout_seconds: u64,
}

impl FeedbackRequest {
    /// Builds a request from a staged escalation.
    #[must_use]
    pub fn from_escalation(
        escalation: &EscalationRequest,
        run_id: impl Into<String>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: run_id.into(),
            phase: escalation.phase,
            reason: escalation.reason.clone(),
            question: escalation.question.clone(),
            context: escalation.context.clone(),
            options: escalation.options.clone(),
            default_option: escalation.default_option.clone(),
            timeout_seconds,
        }
    }
}

/// Delivers a question to a human and returns the raw answer.
///
/// The gate bounds the call with its own timeout; implementations may wait
/// indefinitely.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HumanFeedbackChannel: Send + Sync {
    /// Asks the question and waits for an answer.
    async fn ask(&self, request: &FeedbackRequest) -> anyhow::Result<String>;
}
