//! Orchestration events for observability.
//!
//! The orchestrator reports what it does through an [`EventSink`]. Sinks
//! are passed in explicitly; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the orchestrator.
pub mod names {
    /// A run started or resumed.
    pub const RUN_STARTED: &str = "run.started";
    /// A run reached `Complete` or `Error`.
    pub const RUN_FINISHED: &str = "run.finished";
    /// A stage attempt is about to call the producer.
    pub const STAGE_ATTEMPT: &str = "stage.attempt";
    /// A guardrail accepted a stage output.
    pub const GUARDRAIL_PASSED: &str = "guardrail.passed";
    /// A guardrail rejected a stage output.
    pub const GUARDRAIL_FAILED: &str = "guardrail.failed";
    /// The pipeline moved between phases.
    pub const PHASE_TRANSITION: &str = "phase.transition";
    /// A phase-level failure was classified and a recovery action chosen.
    pub const RECOVERY_DECIDED: &str = "recovery.decided";
    /// The run paused for a human.
    pub const ESCALATED: &str = "human.escalated";
    /// A human (or the timeout default) answered.
    pub const FEEDBACK_RESOLVED: &str = "human.resolved";
    /// State was written to disk.
    pub const STATE_PERSISTED: &str = "state.persisted";
}
