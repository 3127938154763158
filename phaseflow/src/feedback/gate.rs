//! Asking the staged question and recording the answer.

use super::channel::{FeedbackRequest, HumanFeedbackChannel};
use super::decision::FeedbackDecision;
use crate::cancellation::CancellationToken;
use crate::errors::{PhaseflowError, Result};
use crate::state::{meta, EscalationRequest, PipelineState};
use crate::utils::iso_timestamp;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The answer to a staged escalation.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackResolution {
    /// The escalation that was answered.
    pub escalation: EscalationRequest,
    /// Raw answer (the default option on timeout).
    pub response: String,
    /// Parsed answer.
    pub decision: FeedbackDecision,
    /// True when no answer arrived in time.
    pub timed_out: bool,
}

/// Resolves a paused run through a [`HumanFeedbackChannel`].
#[derive(Clone)]
pub struct HumanFeedbackGate {
    channel: Arc<dyn HumanFeedbackChannel>,
    timeout: Duration,
    cancellation: Arc<CancellationToken>,
}

impl HumanFeedbackGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(channel: Arc<dyn HumanFeedbackChannel>, timeout: Duration) -> Self {
        Self {
            channel,
            timeout,
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Asks the staged question and records the answer on `state`.
    ///
    /// On timeout or channel failure the default option is used. The raw
    /// answer is stored in `human_feedback` and the exchange is appended to
    /// the human interaction log. The phase and the staged question are left
    /// in place until the caller has applied the decision
    /// (see [`PipelineState::finish_escalation`]).
    pub async fn resolve(&self, state: &mut PipelineState) -> Result<FeedbackResolution> {
        let escalation = EscalationRequest::read_from(&state.metadata).ok_or_else(|| {
            PhaseflowError::InvalidState("awaiting human input without a staged question".into())
        })?;
        let request =
            FeedbackRequest::from_escalation(&escalation, &state.run_id, self.timeout.as_secs());

        info!(
            run_id = %state.run_id,
            phase = %escalation.phase,
            reason = %escalation.reason,
            question = %escalation.question,
            "Waiting for human feedback"
        );

        let ask = tokio::time::timeout(self.timeout, self.channel.ask(&request));
        let answer = tokio::select! {
            biased;
            () = self.cancellation.cancelled() => {
                return Err(PhaseflowError::cancelled(
                    state.current_phase,
                    self.cancellation.reason().unwrap_or_else(|| "cancelled".to_string()),
                ));
            }
            answer = ask => answer,
        };

        let (response, timed_out) = match answer {
            Ok(Ok(text)) if !text.trim().is_empty() => (text, false),
            Ok(Ok(_)) => {
                warn!(run_id = %state.run_id, "Empty human response; using default option");
                (escalation.default_option.clone(), false)
            }
            Ok(Err(err)) => {
                warn!(run_id = %state.run_id, error = %err, "Feedback channel failed; using default option");
                (escalation.default_option.clone(), false)
            }
            Err(_) => {
                warn!(
                    run_id = %state.run_id,
                    timeout_secs = self.timeout.as_secs(),
                    default_option = %escalation.default_option,
                    "Human feedback timed out; using default option"
                );
                (escalation.default_option.clone(), true)
            }
        };
        let decision = FeedbackDecision::parse(&response);

        state.human_feedback = Some(response.clone());
        append_interaction(state, &escalation, &response, &decision, timed_out);

        info!(
            run_id = %state.run_id,
            decision = %decision,
            timed_out,
            "Human feedback resolved"
        );
        Ok(FeedbackResolution {
            escalation,
            response,
            decision,
            timed_out,
        })
    }
}

fn append_interaction(
    state: &mut PipelineState,
    escalation: &EscalationRequest,
    response: &str,
    decision: &FeedbackDecision,
    timed_out: bool,
) {
    let entry = json!({
        "phase": escalation.phase,
        "reason": escalation.reason,
        "question": escalation.question,
        "response": response,
        "decision": decision.as_str(),
        "timed_out": timed_out,
        "timestamp": iso_timestamp(),
    });
    let log = state
        .metadata
        .entry(meta::HUMAN_INTERACTIONS.to_string())
        .or_insert_with(|| json!([]));
    if !log.is_array() {
        *log = json!([]);
    }
    if let Some(items) = log.as_array_mut() {
        items.push(entry);
    }
}

impl std::fmt::Debug for HumanFeedbackGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanFeedbackGate")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
