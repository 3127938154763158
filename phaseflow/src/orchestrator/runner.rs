//! The run loop.

use super::builder::OrchestratorBuilder;
use super::report::RunReport;
use crate::cancellation::CancellationToken;
use crate::config::OrchestratorConfig;
use crate::core::{Phase, StageOutcome};
use crate::errors::{PhaseflowError, Result};
use crate::events::{names, EventSink};
use crate::feedback::{FeedbackDecision, HumanFeedbackChannel, HumanFeedbackGate};
use crate::guardrails::{GuardrailPredicate, GuardrailRegistry, GuardrailRetry, GuardrailStats};
use crate::observability::PhaseTimer;
use crate::persistence::StateStore;
use crate::recovery::{CircuitBreaker, ErrorClassifier, RecoveryAction, RecoveryHandler};
use crate::routing::{route, RoutingConfig};
use crate::stages::{StageContext, StageProducer};
use crate::state::PipelineState;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Runs pipeline states to completion, error or a human pause.
pub struct Orchestrator {
    config: OrchestratorConfig,
    guardrails: HashMap<Phase, Arc<dyn GuardrailPredicate>>,
    retry: GuardrailRetry,
    recovery: RecoveryHandler,
    gate: HumanFeedbackGate,
    store: StateStore,
    routing: RoutingConfig,
    events: Arc<dyn EventSink>,
    cancellation: Arc<CancellationToken>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("guardrails", &self.guardrails)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Starts a builder.
    #[must_use]
    pub fn builder(
        producer: Arc<dyn StageProducer>,
        feedback: Arc<dyn HumanFeedbackChannel>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(producer, feedback)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        config: OrchestratorConfig,
        producer: Arc<dyn StageProducer>,
        registry: &GuardrailRegistry,
        feedback: Arc<dyn HumanFeedbackChannel>,
        classifier: ErrorClassifier,
        events: Arc<dyn EventSink>,
        cancellation: Arc<CancellationToken>,
        stats: GuardrailStats,
    ) -> Self {
        let guardrails = Phase::STAGES
            .iter()
            .map(|stage| (*stage, registry.resolve(*stage)))
            .collect();
        let store = config.store();
        let retry = GuardrailRetry::new(producer)
            .with_stats(stats)
            .with_cancellation(Arc::clone(&cancellation))
            .with_event_sink(Arc::clone(&events))
            .with_timeout(config.producer_timeout());
        let recovery = RecoveryHandler::new(classifier, config.selector())
            .with_store(store.clone())
            .with_event_sink(Arc::clone(&events));
        let gate = HumanFeedbackGate::new(feedback, config.feedback_timeout())
            .with_cancellation(Arc::clone(&cancellation));
        let routing = config.routing();

        Self {
            config,
            guardrails,
            retry,
            recovery,
            gate,
            store,
            routing,
            events,
            cancellation,
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The snapshot store.
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The cancellation token shared by every suspension point.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Guardrail counters.
    #[must_use]
    pub fn guardrail_stats(&self) -> &GuardrailStats {
        self.retry.stats()
    }

    fn breaker(&self) -> &CircuitBreaker {
        self.recovery.selector().breaker()
    }

    /// Creates a state for `input` with the configured retry ceiling.
    #[must_use]
    pub fn new_state(&self, input: impl Into<String>) -> PipelineState {
        PipelineState::new(input).with_max_retries(self.config.max_retries)
    }

    /// Drives `state` until it reaches `Complete` or `Error`.
    ///
    /// Escalations are resolved through the feedback gate as they happen.
    /// Fails with `Cancelled` when the token fires, with `IterationLimit`
    /// when the loop does not settle, and with the invariant errors of the
    /// state API. The final state is persisted.
    pub async fn run(&self, state: &mut PipelineState) -> Result<RunReport> {
        let span = info_span!("phaseflow_run", run_id = %state.run_id);
        self.run_loop(state).instrument(span).await
    }

    /// Loads a snapshot and continues it.
    pub async fn resume(&self, path: impl AsRef<Path>) -> Result<(PipelineState, RunReport)> {
        let mut state = StateStore::load(path)?;
        info!(run_id = %state.run_id, phase = %state.current_phase, "Resuming run");
        let report = self.run(&mut state).await?;
        Ok((state, report))
    }

    async fn run_loop(&self, state: &mut PipelineState) -> Result<RunReport> {
        info!(
            phase = %state.current_phase,
            max_retries = state.max_retries,
            "Starting pipeline run"
        );
        self.events.try_emit(
            names::RUN_STARTED,
            Some(json!({"run_id": state.run_id, "phase": state.current_phase})),
        );

        let mut iterations = 0;
        while !state.is_terminal() {
            if self.cancellation.is_cancelled() {
                return Err(self.cancelled(state.current_phase));
            }
            if iterations >= self.config.max_iterations {
                warn!(phase = %state.current_phase, iterations, "Iteration limit reached");
                self.persist(state)?;
                return Err(PhaseflowError::IterationLimit {
                    phase: state.current_phase,
                    limit: self.config.max_iterations,
                });
            }
            iterations += 1;

            match state.current_phase {
                Phase::AwaitingHuman => self.resolve_escalation(state).await?,
                phase => self.run_phase(state, phase).await?,
            }
        }

        self.persist(state)?;
        let report = RunReport::new(state, iterations, self.retry.stats().snapshot());
        info!(
            final_phase = %report.final_phase,
            exit_code = report.exit_code,
            iterations,
            errors = report.errors.len(),
            "Pipeline run finished"
        );
        self.events.try_emit(
            names::RUN_FINISHED,
            Some(json!({
                "run_id": report.run_id,
                "final_phase": report.final_phase,
                "exit_code": report.exit_code,
                "iterations": iterations,
            })),
        );
        Ok(report)
    }

    async fn run_phase(&self, state: &mut PipelineState, phase: Phase) -> Result<()> {
        let timer = PhaseTimer::start();

        let outcome = match self.check_input(phase, &state.input_description) {
            Some(reason) => {
                warn!(phase = %phase, reason = %reason, "Input rejected before intake");
                StageOutcome::invalid(reason)
            }
            None => self.produce(state, phase).await?,
        };

        let before = state.current_phase;
        let (step, failure) = route(&outcome, state, &self.routing)?;
        debug!(phase = %phase, step = %step, duration_ms = timer.elapsed_ms(), "Phase executed");

        if let Some(failure) = failure {
            let recovery = self.recovery.handle(state, &failure)?;
            if let RecoveryAction::Retry { delay, .. } = recovery.action {
                self.sleep(phase, delay).await?;
            }
            return Ok(());
        }

        if state.current_phase != before {
            self.events.try_emit(
                names::PHASE_TRANSITION,
                Some(json!({"from": before, "to": state.current_phase, "step": step})),
            );
        }
        if step.is_advance() {
            self.breaker().reset(state, phase);
            if self.config.persist_on_success {
                self.persist(state)?;
            }
        }
        Ok(())
    }

    async fn produce(&self, state: &mut PipelineState, phase: Phase) -> Result<StageOutcome> {
        let mut ctx = StageContext::from_state(state, phase);
        let guardrail = self.guardrail_for(phase);
        let result = self
            .retry
            .attempt(phase, &mut ctx, guardrail.as_ref(), self.config.guardrail_max_retries)
            .await;
        // A cancelled attempt keeps its queued feedback for the resumed run.
        if !matches!(result, Err(PhaseflowError::Cancelled { .. })) {
            state.take_feedback(phase);
        }
        match result {
            Ok(attempt) => {
                debug!(phase = %phase, attempts_used = attempt.attempts_used, "Stage produced output");
                Ok(StageOutcome::from_output(&attempt.output))
            }
            Err(err @ PhaseflowError::GuardrailExhausted { .. }) => {
                Ok(StageOutcome::failed(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    fn guardrail_for(&self, phase: Phase) -> Arc<dyn GuardrailPredicate> {
        self.guardrails
            .get(&phase)
            .cloned()
            .unwrap_or_else(|| GuardrailRegistry::new().resolve(phase))
    }

    fn check_input(&self, phase: Phase, input: &str) -> Option<String> {
        if phase != Phase::Intake {
            return None;
        }
        let length = input.trim().chars().count();
        if length == 0 {
            Some("input description is empty".to_string())
        } else if length < self.config.min_input_length {
            Some(format!(
                "input description is too short ({length} characters, minimum {})",
                self.config.min_input_length
            ))
        } else if length > self.config.max_input_length {
            Some(format!(
                "input description is too long ({length} characters, maximum {})",
                self.config.max_input_length
            ))
        } else {
            None
        }
    }

    async fn resolve_escalation(&self, state: &mut PipelineState) -> Result<()> {
        // Snapshot before blocking on a human.
        self.persist(state)?;
        let resolution = self.gate.resolve(state).await?;
        let escalation = &resolution.escalation;
        self.events.try_emit(
            names::FEEDBACK_RESOLVED,
            Some(json!({
                "phase": escalation.phase,
                "reason": escalation.reason,
                "decision": resolution.decision.as_str(),
                "timed_out": resolution.timed_out,
            })),
        );

        match &resolution.decision {
            FeedbackDecision::Abort => {
                state.transition_to(
                    Phase::Error,
                    format!("aborted by human after {} ({})", escalation.phase, escalation.reason),
                )?;
            }
            FeedbackDecision::Retry | FeedbackDecision::Guidance(_) => {
                let resume_to = escalation.resume_to;
                state.rewind_to(resume_to)?;
                for phase in [resume_to, escalation.phase] {
                    self.breaker().reset(state, phase);
                    state.reset_retries(phase);
                }
                if let FeedbackDecision::Guidance(text) = &resolution.decision {
                    if resume_to == Phase::Intake {
                        state.input_description.clone_from(text);
                    } else {
                        state.push_feedback(resume_to, text.clone());
                    }
                }
                info!(resume_to = %resume_to, decision = %resolution.decision, "Resuming after human feedback");
            }
            FeedbackDecision::Proceed => {
                state.rewind_to(escalation.phase)?;
                self.breaker().reset(state, escalation.phase);
                state.resolve_errors(escalation.phase);
                let to = state.advance(format!("{} accepted by human", escalation.phase))?;
                info!(from = %escalation.phase, to = %to, "Proceeding after human feedback");
            }
        }
        state.finish_escalation();

        if self.config.persist_on_success {
            self.persist(state)?;
        }
        Ok(())
    }

    async fn sleep(&self, phase: Phase, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(self.cancelled(phase)),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn persist(&self, state: &mut PipelineState) -> Result<()> {
        let path = self.store.persist(state, None)?;
        self.events.try_emit(
            names::STATE_PERSISTED,
            Some(json!({"phase": state.current_phase, "path": path.display().to_string()})),
        );
        Ok(())
    }

    fn cancelled(&self, phase: Phase) -> PhaseflowError {
        PhaseflowError::cancelled(
            phase,
            self.cancellation
                .reason()
                .unwrap_or_else(|| "cancelled".to_string()),
        )
    }
}
