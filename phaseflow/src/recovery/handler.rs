//! Handling of phase-level failures.

use super::classifier::{Classification, ErrorClassifier, ErrorRecord, MatchedRule};
use super::strategy::{RecoveryAction, RecoverySelector};
use crate::core::Phase;
use crate::errors::Result;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::persistence::StateStore;
use crate::state::{EscalationRequest, PipelineError, PipelineState};
use crate::utils::truncate;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const QUESTION_MESSAGE_CHARS: usize = 300;

/// A phase that failed, as seen by recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFailure {
    /// The failing phase.
    pub phase: Phase,
    /// Error message, if the failure produced one.
    pub message: Option<String>,
    /// Stack trace, if any. Logged and persisted, never matched.
    pub stack_trace: Option<String>,
}

impl PhaseFailure {
    /// Creates a failure with a message.
    #[must_use]
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: Some(message.into()),
            stack_trace: None,
        }
    }

    /// Creates a failure with no message.
    #[must_use]
    pub fn unexplained(phase: Phase) -> Self {
        Self {
            phase,
            message: None,
            stack_trace: None,
        }
    }

    /// Sets the stack trace.
    #[must_use]
    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }

    fn record(&self) -> Option<ErrorRecord> {
        let message = self.message.as_deref().filter(|m| !m.trim().is_empty())?;
        let record = ErrorRecord::new(message);
        Some(match &self.stack_trace {
            Some(trace) => record.with_stack_trace(trace.clone()),
            None => record,
        })
    }
}

/// What recovery decided and did.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOutcome {
    /// Classification, or `None` for a failure with no message.
    pub classification: Option<Classification>,
    /// The chosen action.
    pub action: RecoveryAction,
    /// The phase's failure streak after this failure.
    pub consecutive_failures: u32,
    /// Snapshot written for this failure.
    pub snapshot: Option<PathBuf>,
}

/// Classifies a failure, picks an action and applies it to the state.
#[derive(Clone)]
pub struct RecoveryHandler {
    classifier: ErrorClassifier,
    selector: RecoverySelector,
    store: Option<StateStore>,
    events: Arc<dyn EventSink>,
}

impl RecoveryHandler {
    /// Creates a handler that does not persist.
    #[must_use]
    pub fn new(classifier: ErrorClassifier, selector: RecoverySelector) -> Self {
        Self {
            classifier,
            selector,
            store: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Persists the state on every handled failure.
    #[must_use]
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// The selector (and through it, the breaker and backoff).
    #[must_use]
    pub fn selector(&self) -> &RecoverySelector {
        &self.selector
    }

    /// Handles one failure.
    ///
    /// The action is decided before the failure is counted, then the
    /// failure is recorded on the breaker and in the error log. A
    /// recoverable failure queues a corrective instruction for the phase's
    /// next attempt; an escalation stages a question and moves the run to
    /// `AwaitingHuman`. Retry delays are left to the caller.
    pub fn handle(&self, state: &mut PipelineState, failure: &PhaseFailure) -> Result<RecoveryOutcome> {
        let phase = failure.phase;
        let record = failure.record();
        let classification = record.as_ref().map(|r| self.classifier.explain(r));
        let category = classification.as_ref().map(|c| c.category);

        let action = self.selector.decide(category, state, phase, state.max_retries);
        let consecutive_failures = self.selector.breaker().record_failure(state, phase);

        let message = record
            .as_ref()
            .map_or_else(|| "failure without an error message".to_string(), |r| r.message.clone());
        let error_type = category.map_or("unknown", |c| c.as_str());
        state.record_error(PipelineError::new(
            phase,
            error_type,
            message.clone(),
            !action.is_escalation(),
        ));

        warn!(
            run_id = %state.run_id,
            phase = %phase,
            category = error_type,
            rule = ?classification.as_ref().map(|c| &c.rule),
            action = action.name(),
            consecutive_failures,
            error = %message,
            "Phase failed"
        );

        match &action {
            RecoveryAction::Retry { delay, backoff_attempt } => {
                info!(
                    phase = %phase,
                    backoff_attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retrying after backoff"
                );
            }
            RecoveryAction::RetryWithFeedback { instruction } => {
                state.push_feedback(phase, format!("{instruction}\nError: {message}"));
            }
            RecoveryAction::Escalate { reason } => {
                let request = EscalationRequest::new(
                    phase,
                    reason.as_str(),
                    format!(
                        "The {phase} stage failed ({reason}): {}. Retry, proceed, or abort?",
                        truncate(&message, QUESTION_MESSAGE_CHARS)
                    ),
                )
                .with_context(json!({
                    "category": error_type,
                    "message": message,
                    "consecutive_failures": consecutive_failures,
                    "retry_count": state.retry_count(phase),
                }));
                state.escalate(&request)?;
            }
        }

        let error_context = json!({
            "phase": phase,
            "category": error_type,
            "rule": classification.as_ref().map(|c| rule_name(&c.rule)),
            "message": message,
            "stack_trace": failure.stack_trace,
            "action": action.name(),
            "consecutive_failures": consecutive_failures,
        });
        let snapshot = match &self.store {
            Some(store) => Some(store.persist(state, Some(error_context.clone()))?),
            None => None,
        };

        self.events.try_emit(names::RECOVERY_DECIDED, Some(error_context));
        if action.is_escalation() {
            self.events.try_emit(
                names::ESCALATED,
                Some(json!({"phase": phase, "reason": escalation_reason(&action)})),
            );
        }

        Ok(RecoveryOutcome {
            classification,
            action,
            consecutive_failures,
            snapshot,
        })
    }
}

fn rule_name(rule: &MatchedRule) -> String {
    match rule {
        MatchedRule::Keyword(keyword) => format!("keyword:{keyword}"),
        MatchedRule::Pattern(pattern) => format!("pattern:{pattern}"),
        MatchedRule::Default => "default".to_string(),
    }
}

fn escalation_reason(action: &RecoveryAction) -> Option<&'static str> {
    match action {
        RecoveryAction::Escalate { reason } => Some(reason.as_str()),
        _ => None,
    }
}

impl std::fmt::Debug for RecoveryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryHandler")
            .field("selector", &self.selector)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
