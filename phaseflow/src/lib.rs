//! # Phaseflow
//!
//! A guardrail-gated phase orchestration core for multi-stage generation
//! pipelines.
//!
//! A run moves through intake, planning, development, testing and
//! deployment. Each stage is produced by a host-supplied
//! [`StageProducer`](stages::StageProducer) and validated by a
//! [`GuardrailPredicate`](guardrails::GuardrailPredicate); failures are
//! classified, retried with backoff or feedback, and escalated to a human
//! when the circuit breaker opens. State is persisted as one JSON snapshot
//! per run and can be resumed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use phaseflow::prelude::*;
//!
//! let orchestrator = Orchestrator::builder(producer, feedback_channel)
//!     .with_config(OrchestratorConfig::new().with_output_dir("./runs"))
//!     .with_guardrails(GuardrailRegistry::new().with(Phase::Development, no_secrets))
//!     .build()?;
//!
//! let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
//! let report = orchestrator.run(&mut state).await?;
//! std::process::exit(report.exit_code);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod feedback;
pub mod guardrails;
pub mod observability;
pub mod orchestrator;
pub mod persistence;
pub mod recovery;
pub mod routing;
pub mod stages;
pub mod state;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::OrchestratorConfig;
    pub use crate::core::{
        OutcomeStatus, Phase, PhaseTransition, StageArtifacts, StageOutcome, StageOutput,
    };
    pub use crate::errors::PhaseflowError;
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::feedback::{
        FeedbackDecision, FeedbackRequest, HumanFeedbackChannel, PendingFeedbackChannel,
    };
    pub use crate::guardrails::{
        FnGuardrail, GuardrailChain, GuardrailPredicate, GuardrailRegistry, GuardrailVerdict,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::orchestrator::{Orchestrator, RunReport};
    pub use crate::persistence::StateStore;
    pub use crate::recovery::{ErrorCategory, ErrorClassifier};
    pub use crate::stages::{FnProducer, StageContext, StageProducer};
    pub use crate::state::{PipelineError, PipelineState};
}
