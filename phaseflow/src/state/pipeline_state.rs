//! The pipeline state aggregate.

use super::escalation::EscalationRequest;
use super::meta;
use crate::core::{Phase, PhaseTransition, StageArtifacts};
use crate::errors::PhaseflowError;
use crate::utils::generate_run_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Default retry ceiling per phase.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// One failure recorded during a run. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineError {
    /// Phase that failed.
    pub phase: Phase,
    /// Error kind (category name or error code).
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Whether recovery was possible.
    pub recoverable: bool,
    /// Set once the same phase later completed.
    #[serde(default)]
    pub resolved: bool,
}

impl PipelineError {
    /// Creates an error record stamped with the current time.
    #[must_use]
    pub fn new(
        phase: Phase,
        error_type: impl Into<String>,
        message: impl Into<String>,
        recoverable: bool,
    ) -> Self {
        Self {
            phase,
            error_type: error_type.into(),
            message: message.into(),
            timestamp: Utc::now(),
            recoverable,
            resolved: false,
        }
    }
}

/// The canonical, serializable record of one pipeline run.
///
/// Mutated only through its methods so the transition and retry invariants
/// hold:
/// - every history entry is a single forward step or a move into a side state
/// - retry counts never exceed `max_retries`
/// - `current_phase` equals the last transition's `to_phase` (or `Intake`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique run id.
    pub run_id: String,
    /// What the user asked for.
    pub input_description: String,
    /// Current phase.
    pub current_phase: Phase,
    /// Artifacts of completed phases.
    #[serde(default)]
    pub artifacts: StageArtifacts,
    /// Append-only transition history.
    #[serde(default)]
    pub phase_history: Vec<PhaseTransition>,
    /// Every error recorded during the run.
    #[serde(default)]
    pub errors: Vec<PipelineError>,
    /// Retries used per phase.
    #[serde(default)]
    pub retry_counts: BTreeMap<Phase, u32>,
    /// Retry ceiling per phase.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached `Complete`.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Open key/value bag (feedback prompts, breaker counters, last error).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// The run is paused for a human.
    #[serde(default)]
    pub awaiting_human_input: bool,
    /// The last human response.
    #[serde(default)]
    pub human_feedback: Option<String>,
}

impl PipelineState {
    /// Creates a fresh run in `Intake`.
    #[must_use]
    pub fn new(input_description: impl Into<String>) -> Self {
        Self {
            run_id: generate_run_id(),
            input_description: input_description.into(),
            current_phase: Phase::Intake,
            artifacts: StageArtifacts::default(),
            phase_history: Vec::new(),
            errors: Vec::new(),
            retry_counts: BTreeMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            started_at: Utc::now(),
            completed_at: None,
            metadata: BTreeMap::new(),
            awaiting_human_input: false,
            human_feedback: None,
        }
    }

    /// Sets the retry ceiling.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    // ---- transitions ------------------------------------------------------

    /// Moves to `to`, appending a history record.
    ///
    /// Fails with `InvalidTransition` unless `to` is the next phase on the
    /// main line or a side state.
    pub fn transition_to(
        &mut self,
        to: Phase,
        reason: impl Into<String>,
    ) -> Result<&PhaseTransition, PhaseflowError> {
        let from = self.current_phase;
        from.check_transition(to)?;

        let transition = PhaseTransition::new(from, to, reason);
        info!(
            run_id = %self.run_id,
            from = %from,
            to = %to,
            reason = %transition.reason,
            "Phase transition"
        );
        self.current_phase = to;
        if to == Phase::Complete {
            self.completed_at = Some(transition.timestamp);
        }
        self.phase_history.push(transition);
        Ok(&self.phase_history[self.phase_history.len() - 1])
    }

    /// Moves one step forward along the main line.
    pub fn advance(&mut self, reason: impl Into<String>) -> Result<Phase, PhaseflowError> {
        let from = self.current_phase;
        let to = from.next().ok_or_else(|| {
            PhaseflowError::invalid_transition(from, from, "no next phase to advance to")
        })?;
        self.transition_to(to, reason)?;
        Ok(to)
    }

    /// Pops the last transition and restores its source phase.
    ///
    /// Returns the restored phase, or `None` when the history is empty.
    pub fn rollback_last_phase(&mut self) -> Option<Phase> {
        let last = self.phase_history.pop()?;
        debug!(
            run_id = %self.run_id,
            from = %last.to_phase,
            to = %last.from_phase,
            "Rolled back phase transition"
        );
        self.current_phase = last.from_phase;
        if last.to_phase == Phase::Complete {
            self.completed_at = None;
        }
        Some(last.from_phase)
    }

    /// Rolls back until `target` is the current phase.
    ///
    /// Returns the number of transitions popped. Fails without touching the
    /// history when `target` cannot be reached by rolling back.
    pub fn rewind_to(&mut self, target: Phase) -> Result<usize, PhaseflowError> {
        if self.current_phase == target {
            return Ok(0);
        }
        let position = self
            .phase_history
            .iter()
            .rposition(|t| t.from_phase == target)
            .ok_or_else(|| {
                PhaseflowError::invalid_transition(
                    self.current_phase,
                    target,
                    "target phase is not in the transition history",
                )
            })?;

        let popped = self.phase_history.len() - position;
        for _ in 0..popped {
            self.rollback_last_phase();
        }
        Ok(popped)
    }

    /// Checks invariants (a) and (c) against the stored history.
    pub fn validate_history(&self) -> Result<(), PhaseflowError> {
        let mut cursor = Phase::Intake;
        for (index, transition) in self.phase_history.iter().enumerate() {
            if transition.from_phase != cursor {
                return Err(PhaseflowError::InvalidState(format!(
                    "transition {index} starts at '{}' but the previous one ended at '{cursor}'",
                    transition.from_phase
                )));
            }
            transition.from_phase.check_transition(transition.to_phase)?;
            cursor = transition.to_phase;
        }
        if cursor != self.current_phase {
            return Err(PhaseflowError::InvalidState(format!(
                "current phase is '{}' but history ends at '{cursor}'",
                self.current_phase
            )));
        }
        Ok(())
    }

    // ---- retries ----------------------------------------------------------

    /// Retries used for `phase`.
    #[must_use]
    pub fn retry_count(&self, phase: Phase) -> u32 {
        self.retry_counts.get(&phase).copied().unwrap_or(0)
    }

    /// Returns true while `phase` has retry budget left.
    #[must_use]
    pub fn can_retry(&self, phase: Phase) -> bool {
        self.retry_count(phase) < self.max_retries
    }

    /// Uses one retry for `phase`.
    ///
    /// Fails with `RetryLimitExceeded` instead of clamping once the ceiling
    /// is reached.
    pub fn increment_retry(&mut self, phase: Phase) -> Result<u32, PhaseflowError> {
        let count = self.retry_count(phase);
        if count >= self.max_retries {
            return Err(PhaseflowError::RetryLimitExceeded {
                phase,
                count,
                max_retries: self.max_retries,
            });
        }
        self.retry_counts.insert(phase, count + 1);
        Ok(count + 1)
    }

    /// Clears the retry budget of `phase` after a human granted a new one.
    pub fn reset_retries(&mut self, phase: Phase) {
        self.retry_counts.remove(&phase);
    }

    // ---- errors -----------------------------------------------------------

    /// Appends an error record.
    pub fn record_error(&mut self, error: PipelineError) {
        self.errors.push(error);
    }

    /// Marks every error of `phase` as resolved.
    pub fn resolve_errors(&mut self, phase: Phase) {
        for error in self.errors.iter_mut().filter(|e| e.phase == phase) {
            error.resolved = true;
        }
    }

    /// Errors not yet resolved by a later success.
    pub fn unresolved_errors(&self) -> impl Iterator<Item = &PipelineError> {
        self.errors.iter().filter(|e| !e.resolved)
    }

    // ---- metadata ---------------------------------------------------------

    /// Reads a metadata value.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Reads a metadata string.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }

    /// Writes a metadata value.
    pub fn set_meta(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Queues feedback for the next attempt of `phase`.
    pub fn push_feedback(&mut self, phase: Phase, feedback: impl Into<String>) {
        let entry = self
            .metadata
            .entry(meta::PENDING_FEEDBACK.to_string())
            .or_insert_with(|| serde_json::json!({}));
        if !entry.is_object() {
            *entry = serde_json::json!({});
        }
        if let Some(map) = entry.as_object_mut() {
            let list = map
                .entry(phase.as_str().to_string())
                .or_insert_with(|| serde_json::json!([]));
            if let Some(items) = list.as_array_mut() {
                items.push(serde_json::Value::String(feedback.into()));
            }
        }
    }

    /// Feedback queued for `phase`, without consuming it.
    #[must_use]
    pub fn pending_feedback(&self, phase: Phase) -> Vec<String> {
        self.metadata
            .get(meta::PENDING_FEEDBACK)
            .and_then(|v| v.get(phase.as_str()))
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Removes and returns the feedback queued for `phase`.
    pub fn take_feedback(&mut self, phase: Phase) -> Vec<String> {
        let feedback = self.pending_feedback(phase);
        if let Some(map) = self
            .metadata
            .get_mut(meta::PENDING_FEEDBACK)
            .and_then(serde_json::Value::as_object_mut)
        {
            map.remove(phase.as_str());
        }
        feedback
    }

    /// Stages a human question in metadata and moves to `AwaitingHuman`.
    pub fn escalate(&mut self, request: &EscalationRequest) -> Result<(), PhaseflowError> {
        self.current_phase.check_transition(Phase::AwaitingHuman)?;
        request.write_to(&mut self.metadata);
        self.awaiting_human_input = true;
        self.transition_to(
            Phase::AwaitingHuman,
            format!("escalated from {}: {}", request.phase, request.reason),
        )?;
        Ok(())
    }

    /// Drops the staged question once a human decision has been applied.
    pub fn finish_escalation(&mut self) {
        self.awaiting_human_input = false;
        EscalationRequest::clear(&mut self.metadata);
    }

    // ---- lifecycle --------------------------------------------------------

    /// Returns true at `Complete` or `Error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.current_phase.is_terminal()
    }

    /// Process exit code for the run.
    ///
    /// 0 when complete with every error resolved, 1 when the run ended in
    /// `Error` (or completed with unresolved errors), 2 when paused or still
    /// in progress.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.current_phase {
            Phase::Complete if self.unresolved_errors().next().is_none() => 0,
            Phase::Complete | Phase::Error => 1,
            _ => 2,
        }
    }
}
