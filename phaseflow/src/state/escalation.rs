//! Escalation prompts staged in the state's metadata bag.

use super::meta;
use crate::core::Phase;
use std::collections::BTreeMap;

/// Default answers offered on escalation.
pub const DEFAULT_OPTIONS: [&str; 3] = ["retry", "proceed", "abort"];

/// A question for a human, written to metadata before pausing.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationRequest {
    /// Phase where the problem surfaced.
    pub phase: Phase,
    /// Machine-readable reason (e.g. `circuit_breaker`).
    pub reason: String,
    /// Question to show.
    pub question: String,
    /// Allowed answers.
    pub options: Vec<String>,
    /// Answer used when the human does not respond in time.
    pub default_option: String,
    /// Phase to resume at when the answer is retry or guidance.
    pub resume_to: Phase,
    /// Snapshot of whatever helps the human decide.
    pub context: serde_json::Value,
}

impl EscalationRequest {
    /// Creates a request with the default options, resuming at `phase`.
    #[must_use]
    pub fn new(phase: Phase, reason: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            phase,
            reason: reason.into(),
            question: question.into(),
            options: DEFAULT_OPTIONS.iter().map(|s| (*s).to_string()).collect(),
            default_option: "abort".to_string(),
            resume_to: phase,
            context: serde_json::json!({}),
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Sets the default option.
    #[must_use]
    pub fn with_default_option(mut self, option: impl Into<String>) -> Self {
        self.default_option = option.into();
        self
    }

    /// Sets the resume phase.
    #[must_use]
    pub fn with_resume_to(mut self, phase: Phase) -> Self {
        self.resume_to = phase;
        self
    }

    /// Sets the context snapshot.
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub(crate) fn write_to(&self, metadata: &mut BTreeMap<String, serde_json::Value>) {
        metadata.insert(meta::FEEDBACK_QUESTION.into(), self.question.clone().into());
        metadata.insert(meta::FEEDBACK_OPTIONS.into(), serde_json::json!(self.options));
        metadata.insert(
            meta::FEEDBACK_DEFAULT_OPTION.into(),
            self.default_option.clone().into(),
        );
        metadata.insert(meta::FEEDBACK_RESUME_TO.into(), self.resume_to.as_str().into());
        metadata.insert(meta::ESCALATION_REASON.into(), self.reason.clone().into());
        metadata.insert(meta::ESCALATION_PHASE.into(), self.phase.as_str().into());
        metadata.insert(meta::ESCALATION_CONTEXT.into(), self.context.clone());
    }

    /// Reads a staged request back from metadata.
    ///
    /// Returns `None` if no question is staged.
    #[must_use]
    pub fn read_from(metadata: &BTreeMap<String, serde_json::Value>) -> Option<Self> {
        let question = metadata.get(meta::FEEDBACK_QUESTION)?.as_str()?.to_string();
        let phase = metadata
            .get(meta::ESCALATION_PHASE)
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Phase::Intake);
        let resume_to = metadata
            .get(meta::FEEDBACK_RESUME_TO)
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(phase);
        let options = metadata
            .get(meta::FEEDBACK_OPTIONS)
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            phase,
            reason: metadata
                .get(meta::ESCALATION_REASON)
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            question,
            options,
            default_option: metadata
                .get(meta::FEEDBACK_DEFAULT_OPTION)
                .and_then(serde_json::Value::as_str)
                .unwrap_or("abort")
                .to_string(),
            resume_to,
            context: metadata
                .get(meta::ESCALATION_CONTEXT)
                .cloned()
                .unwrap_or_else(|| serde_json::json!({})),
        })
    }

    /// Removes a staged request from metadata.
    pub(crate) fn clear(metadata: &mut BTreeMap<String, serde_json::Value>) {
        for key in [
            meta::FEEDBACK_QUESTION,
            meta::FEEDBACK_OPTIONS,
            meta::FEEDBACK_DEFAULT_OPTION,
            meta::FEEDBACK_RESUME_TO,
            meta::ESCALATION_REASON,
            meta::ESCALATION_PHASE,
            meta::ESCALATION_CONTEXT,
        ] {
            metadata.remove(key);
        }
    }
}
