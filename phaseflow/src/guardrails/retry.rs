//! The guardrail-retry contract for one stage.

use super::predicate::{GuardrailPredicate, GuardrailVerdict};
use super::stats::GuardrailStats;
use crate::cancellation::CancellationToken;
use crate::core::{OutcomeStatus, Phase, StageOutput};
use crate::errors::{PhaseflowError, Result};
use crate::events::{names, EventSink, NoOpEventSink};
use crate::stages::{StageContext, StageProducer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Feedback used when a producer returns nothing.
pub const EMPTY_OUTPUT_FEEDBACK: &str = "the output was empty";

const DEFAULT_PRODUCER_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of a successful [`GuardrailRetry::attempt`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    /// The validated output, or the producer's error output.
    pub output: StageOutput,
    /// Producer calls made, 1-based.
    pub attempts_used: u32,
}

/// Runs a producer under a guardrail with bounded retries.
///
/// Each call is bounded by a timeout and races the cancellation token. An
/// `error` or `invalid` output skips the guardrail and is returned at once
/// so the caller can route it.
#[derive(Clone)]
pub struct GuardrailRetry {
    producer: Arc<dyn StageProducer>,
    stats: GuardrailStats,
    cancellation: Arc<CancellationToken>,
    events: Arc<dyn EventSink>,
    timeout: Duration,
}

impl GuardrailRetry {
    /// Creates the contract around `producer`.
    #[must_use]
    pub fn new(producer: Arc<dyn StageProducer>) -> Self {
        Self {
            producer,
            stats: GuardrailStats::new(),
            cancellation: Arc::new(CancellationToken::new()),
            events: Arc::new(NoOpEventSink),
            timeout: DEFAULT_PRODUCER_TIMEOUT,
        }
    }

    /// Shares counters with the caller.
    #[must_use]
    pub fn with_stats(mut self, stats: GuardrailStats) -> Self {
        self.stats = stats;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Sets the per-call producer timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The counters.
    #[must_use]
    pub fn stats(&self) -> &GuardrailStats {
        &self.stats
    }

    /// Produces `stage` until `guardrail` passes.
    ///
    /// Makes `max(1, max_retries)` attempts. After each rejection the
    /// feedback is merged into `ctx` for the next attempt. Fails with
    /// `GuardrailExhausted` when every attempt was rejected and with
    /// `Cancelled` when the token fires mid-call.
    pub async fn attempt(
        &self,
        stage: Phase,
        ctx: &mut StageContext,
        guardrail: &dyn GuardrailPredicate,
        max_retries: u32,
    ) -> Result<AttemptOutcome> {
        let total = max_retries.max(1);
        let mut last_feedback = String::new();

        for attempt in 1..=total {
            ctx.attempt = attempt;
            debug!(stage = %stage, attempt, max_attempts = total, "Invoking stage producer");
            self.events.try_emit(
                names::STAGE_ATTEMPT,
                Some(json!({"stage": stage, "attempt": attempt, "max_attempts": total})),
            );

            let output = self.invoke(stage, ctx).await?;
            if output.is_error() || output.status == OutcomeStatus::Invalid {
                info!(
                    stage = %stage,
                    attempt,
                    status = %output.status,
                    error = output.error.as_deref().unwrap_or_default(),
                    "Producer reported failure; skipping guardrail"
                );
                return Ok(AttemptOutcome {
                    output,
                    attempts_used: attempt,
                });
            }

            let verdict = if output.is_empty() {
                GuardrailVerdict::Fail(EMPTY_OUTPUT_FEEDBACK.to_string())
            } else {
                guardrail.check(&output)
            };

            match verdict {
                GuardrailVerdict::Pass(validated) => {
                    self.stats.record_pass(guardrail.name());
                    self.events.try_emit(
                        names::GUARDRAIL_PASSED,
                        Some(json!({"stage": stage, "guardrail": guardrail.name(), "attempt": attempt})),
                    );
                    return Ok(AttemptOutcome {
                        output: validated,
                        attempts_used: attempt,
                    });
                }
                GuardrailVerdict::Fail(feedback) => {
                    self.stats.record_failure(guardrail.name());
                    warn!(
                        stage = %stage,
                        guardrail = guardrail.name(),
                        attempt,
                        feedback = %feedback,
                        "Guardrail rejected stage output"
                    );
                    self.events.try_emit(
                        names::GUARDRAIL_FAILED,
                        Some(json!({
                            "stage": stage,
                            "guardrail": guardrail.name(),
                            "attempt": attempt,
                            "feedback": feedback,
                        })),
                    );
                    ctx.add_guardrail_feedback(&feedback);
                    last_feedback = feedback;
                }
            }
        }

        Err(PhaseflowError::GuardrailExhausted {
            stage,
            guardrail: guardrail.name().to_string(),
            attempts: total,
            last_feedback,
        })
    }

    async fn invoke(&self, stage: Phase, ctx: &StageContext) -> Result<StageOutput> {
        if self.cancellation.is_cancelled() {
            return Err(self.cancelled_error(stage));
        }

        let call = tokio::time::timeout(self.timeout, self.producer.produce(stage, ctx));
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(self.cancelled_error(stage)),
            result = call => Ok(match result {
                Ok(Ok(output)) => output,
                Ok(Err(err)) => StageOutput::error(format!("{err:#}")),
                Err(_) => StageOutput::error(format!(
                    "{stage} producer timed out after {}ms",
                    self.timeout.as_millis()
                )),
            }),
        }
    }

    fn cancelled_error(&self, stage: Phase) -> PhaseflowError {
        PhaseflowError::cancelled(
            stage,
            self.cancellation
                .reason()
                .unwrap_or_else(|| "cancelled".to_string()),
        )
    }
}

impl std::fmt::Debug for GuardrailRetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailRetry")
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}
