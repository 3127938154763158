//! Orchestrator construction.

use super::runner::Orchestrator;
use crate::cancellation::CancellationToken;
use crate::config::OrchestratorConfig;
use crate::errors::{PhaseflowError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::feedback::HumanFeedbackChannel;
use crate::guardrails::{GuardrailRegistry, GuardrailStats};
use crate::stages::StageProducer;
use std::sync::Arc;

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    producer: Arc<dyn StageProducer>,
    feedback: Arc<dyn HumanFeedbackChannel>,
    config: OrchestratorConfig,
    guardrails: GuardrailRegistry,
    events: Arc<dyn EventSink>,
    cancellation: Arc<CancellationToken>,
    stats: GuardrailStats,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("guardrails", &self.guardrails)
            .finish_non_exhaustive()
    }
}

impl OrchestratorBuilder {
    /// Starts a builder with the two required collaborators.
    #[must_use]
    pub fn new(producer: Arc<dyn StageProducer>, feedback: Arc<dyn HumanFeedbackChannel>) -> Self {
        Self {
            producer,
            feedback,
            config: OrchestratorConfig::default(),
            guardrails: GuardrailRegistry::new(),
            events: Arc::new(NoOpEventSink),
            cancellation: Arc::new(CancellationToken::new()),
            stats: GuardrailStats::new(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the guardrails.
    #[must_use]
    pub fn with_guardrails(mut self, guardrails: GuardrailRegistry) -> Self {
        self.guardrails = guardrails;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Shares guardrail counters with the host.
    #[must_use]
    pub fn with_stats(mut self, stats: GuardrailStats) -> Self {
        self.stats = stats;
        self
    }

    /// Validates the configuration and builds the orchestrator.
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate().map_err(PhaseflowError::Config)?;
        let classifier = self.config.error_classifier()?;
        Ok(Orchestrator::from_parts(
            self.config,
            self.producer,
            &self.guardrails,
            self.feedback,
            classifier,
            self.events,
            self.cancellation,
            self.stats,
        ))
    }
}
