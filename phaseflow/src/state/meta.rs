//! Metadata keys shared between the state, the router and the feedback gate.

/// Question shown to the human.
pub const FEEDBACK_QUESTION: &str = "feedback_question";
/// Allowed answers.
pub const FEEDBACK_OPTIONS: &str = "feedback_options";
/// Answer used on timeout.
pub const FEEDBACK_DEFAULT_OPTION: &str = "feedback_default_option";
/// Phase to resume at.
pub const FEEDBACK_RESUME_TO: &str = "feedback_resume_to";
/// Why the run escalated.
pub const ESCALATION_REASON: &str = "escalation_reason";
/// Phase that escalated.
pub const ESCALATION_PHASE: &str = "escalation_phase";
/// Context snapshot for the human.
pub const ESCALATION_CONTEXT: &str = "escalation_context";
/// Context of the most recent persisted error.
pub const LAST_ERROR: &str = "last_error";
/// Feedback queued per phase for its next attempt.
pub const PENDING_FEEDBACK: &str = "pending_feedback";
/// Audit log of resolved escalations.
pub const HUMAN_INTERACTIONS: &str = "human_interactions";

/// Suffix of the per-phase consecutive failure counters.
pub const CONSECUTIVE_FAILURES_SUFFIX: &str = "_consecutive_failures";

/// Metadata key holding the consecutive failure count of `phase`.
#[must_use]
pub fn consecutive_failures_key(phase: crate::core::Phase) -> String {
    format!("{}{CONSECUTIVE_FAILURES_SUFFIX}", phase.as_str())
}
