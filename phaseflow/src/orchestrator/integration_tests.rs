//! End-to-end runs of the orchestrator against scripted collaborators.

#[cfg(test)]
mod tests {
    use crate::config::OrchestratorConfig;
    use crate::core::{keys, Phase, StageOutput};
    use crate::errors::PhaseflowError;
    use crate::events::{names, CollectingEventSink};
    use crate::feedback::{FeedbackRequest, HumanFeedbackChannel};
    use crate::guardrails::{GuardrailRegistry, RequireDataKeys};
    use crate::orchestrator::Orchestrator;
    use crate::recovery::CircuitBreaker;
    use crate::state::{meta, EscalationRequest, PipelineState};
    use crate::testing::{
        assert_exit_code, assert_history_valid, assert_phase, assert_visited,
        development_success_output, happy_path_producer, planning_success_output,
        tests_failed_output, ScriptedProducer, StaticFeedbackChannel,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> OrchestratorConfig {
        OrchestratorConfig::new()
            .with_output_dir(dir.path())
            .with_backoff_schedule_ms(vec![1])
            .with_feedback_timeout_seconds(5)
    }

    fn orchestrator(
        dir: &TempDir,
        producer: &Arc<ScriptedProducer>,
        channel: &Arc<StaticFeedbackChannel>,
    ) -> Orchestrator {
        Orchestrator::builder(producer.clone(), channel.clone())
            .with_config(config(dir))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_completes() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer());
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = Orchestrator::builder(producer.clone(), channel.clone())
            .with_config(config(&dir))
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        let report = orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert_exit_code(&state, 0);
        assert_history_valid(&state);
        assert_visited(
            &state,
            &[
                Phase::Planning,
                Phase::Development,
                Phase::Testing,
                Phase::Deployment,
                Phase::Complete,
            ],
        );
        assert!(report.is_success());
        assert_eq!(report.iterations, 5);
        assert!(state.artifacts.requirements.is_some());
        assert_eq!(state.artifacts.generated_files.as_ref().map(Vec::len), Some(2));
        assert!(state.artifacts.deployment_config.is_some());
        assert!(channel.asked().is_empty());

        assert!(orchestrator.store().path_for(&state.run_id).exists());
        let types = sink.event_types();
        assert_eq!(types.first().map(String::as_str), Some(names::RUN_STARTED));
        assert_eq!(types.last().map(String::as_str), Some(names::RUN_FINISHED));
        assert_eq!(sink.events_of_type(names::PHASE_TRANSITION).len(), 5);
    }

    #[tokio::test]
    async fn test_fatal_error_escalates_and_abort_ends_in_error() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(
            happy_path_producer().then_fail(Phase::Planning, "model not found: llama-70b"),
        );
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        let report = orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Error);
        assert_exit_code(&state, 1);
        assert_eq!(report.final_phase, Phase::Error);
        assert_eq!(producer.call_count(Phase::Planning), 1);

        let asked = channel.asked();
        assert_eq!(asked.len(), 1);
        assert_eq!(asked[0].phase, Phase::Planning);
        assert_eq!(asked[0].reason, "fatal_error");
        assert_eq!(asked[0].default_option, "abort");

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].error_type, "fatal");
        assert!(!report.errors[0].recoverable);
        assert_eq!(state.human_feedback.as_deref(), Some("abort"));
        assert!(!state.awaiting_human_input);
        assert!(state.meta(meta::FEEDBACK_QUESTION).is_none());
        assert_eq!(
            state
                .meta(meta::HUMAN_INTERACTIONS)
                .and_then(serde_json::Value::as_array)
                .map(Vec::len),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_retryable_error_retries_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(
            happy_path_producer().then_fail(Phase::Development, "Connection refused by upstream"),
        );
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        let report = orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert_exit_code(&state, 0);
        assert_eq!(producer.call_count(Phase::Development), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].error_type, "retryable");
        assert!(report.errors[0].resolved);
        assert_eq!(
            CircuitBreaker::default().consecutive_failures(&state, Phase::Development),
            0
        );
        assert!(channel.asked().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_leaves_counters_untouched() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer().then_hang(Phase::Planning));
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let token = Arc::clone(orchestrator.cancellation());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel("host shutdown");
        });

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        let err = orchestrator.run(&mut state).await.unwrap_err();

        match err {
            PhaseflowError::Cancelled { phase, reason } => {
                assert_eq!(phase, Phase::Planning);
                assert_eq!(reason, "host shutdown");
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert_phase(&state, Phase::Planning);
        assert_eq!(state.phase_history.len(), 1);
        assert!(state.retry_counts.is_empty());
        assert!(state.errors.is_empty());
        assert!(state
            .metadata
            .iter()
            .filter(|(key, _)| key.ends_with(meta::CONSECUTIVE_FAILURES_SUFFIX))
            .all(|(_, count)| *count == 0));
    }

    #[tokio::test]
    async fn test_cancelled_attempt_keeps_queued_feedback() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer().then_hang(Phase::Planning));
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let token = Arc::clone(orchestrator.cancellation());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel("host shutdown");
        });

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        state.push_feedback(Phase::Planning, "use postgres");
        let err = orchestrator.run(&mut state).await.unwrap_err();

        assert!(matches!(err, PhaseflowError::Cancelled { .. }));
        assert_eq!(
            producer.contexts_for(Phase::Planning)[0].feedback,
            vec!["use postgres".to_string()]
        );
        assert_eq!(state.pending_feedback(Phase::Planning), vec!["use postgres".to_string()]);
    }

    #[tokio::test]
    async fn test_completed_attempt_consumes_queued_feedback() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer());
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        state.push_feedback(Phase::Planning, "use postgres");
        orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert!(state.pending_feedback(Phase::Planning).is_empty());
    }

    /// Records whether a snapshot existed when the question was asked.
    #[derive(Debug)]
    struct SnapshotCheckingChannel {
        path: PathBuf,
        answer: String,
        seen: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl HumanFeedbackChannel for SnapshotCheckingChannel {
        async fn ask(&self, _request: &FeedbackRequest) -> anyhow::Result<String> {
            self.seen.lock().push(self.path.exists());
            Ok(self.answer.clone())
        }
    }

    #[tokio::test]
    async fn test_snapshot_exists_while_waiting_for_human() {
        let dir = TempDir::new().unwrap();
        let producer =
            Arc::new(happy_path_producer().then(Phase::Testing, tests_failed_output(true)));
        let mut state = PipelineState::new("Build a todo REST API with user accounts");
        let channel = Arc::new(SnapshotCheckingChannel {
            path: config(&dir).store().path_for(&state.run_id),
            answer: "abort".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let orchestrator = Orchestrator::builder(producer.clone(), channel.clone())
            .with_config(config(&dir))
            .build()
            .unwrap();

        orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Error);
        assert_eq!(*channel.seen.lock(), vec![true]);
        let snapshot = orchestrator.store().path_for(&state.run_id);
        let saved = crate::persistence::StateStore::load(&snapshot).unwrap();
        assert_eq!(saved.current_phase, Phase::Error);
    }

    #[tokio::test]
    async fn test_failed_decision_keeps_question_staged() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer());
        let channel = Arc::new(StaticFeedbackChannel::new("retry"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        state.advance("intake ok").unwrap();
        state
            .escalate(
                &EscalationRequest::new(Phase::Planning, "fatal_error", "Model not found")
                    .with_resume_to(Phase::Deployment),
            )
            .unwrap();

        let err = orchestrator.run(&mut state).await.unwrap_err();

        assert!(matches!(err, PhaseflowError::InvalidTransition { .. }));
        assert_phase(&state, Phase::AwaitingHuman);
        assert!(state.awaiting_human_input);
        let staged = EscalationRequest::read_from(&state.metadata).unwrap();
        assert_eq!(staged.question, "Model not found");
    }

    #[tokio::test]
    async fn test_proceed_keeps_files_when_planning_budget_spent() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer().then(
            Phase::Development,
            development_success_output().with_data(keys::INSUFFICIENT_ARCHITECTURE, json!(true)),
        ));
        let channel = Arc::new(StaticFeedbackChannel::new("proceed"));
        let orchestrator = Orchestrator::builder(producer.clone(), channel.clone())
            .with_config(config(&dir).with_max_retries(0))
            .build()
            .unwrap();

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert_eq!(channel.asked()[0].reason, "max_retries_exceeded");
        assert_eq!(producer.call_count(Phase::Development), 1);
        let testing = &producer.contexts_for(Phase::Testing)[0];
        assert_eq!(
            testing.artifacts["generated_files"].as_array().map(Vec::len),
            Some(2)
        );
        assert_history_valid(&state);
    }

    #[tokio::test]
    async fn test_failed_tests_send_feedback_to_development() {
        let dir = TempDir::new().unwrap();
        let producer =
            Arc::new(happy_path_producer().then(Phase::Testing, tests_failed_output(false)));
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert_eq!(state.retry_count(Phase::Testing), 1);
        assert_eq!(producer.call_count(Phase::Development), 2);
        let retried = &producer.contexts_for(Phase::Development)[1];
        assert_eq!(retried.feedback.len(), 1);
        assert!(retried.feedback[0].contains("test_login_rejects_bad_password"));
        assert_history_valid(&state);
    }

    #[tokio::test]
    async fn test_low_confidence_plan_takes_guidance() {
        let dir = TempDir::new().unwrap();
        let producer =
            Arc::new(happy_path_producer().then(Phase::Planning, planning_success_output(0.4)));
        let channel = Arc::new(StaticFeedbackChannel::new("Use PostgreSQL instead of SQLite"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert_eq!(channel.asked()[0].reason, "needs_clarification");
        let replanned = &producer.contexts_for(Phase::Planning)[1];
        assert_eq!(replanned.feedback, vec!["Use PostgreSQL instead of SQLite".to_string()]);
        assert_eq!(
            replanned.human_feedback.as_deref(),
            Some("Use PostgreSQL instead of SQLite")
        );
        assert_history_valid(&state);
    }

    #[tokio::test]
    async fn test_invalid_input_replaced_by_guidance() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer());
        let channel = Arc::new(StaticFeedbackChannel::new("Build a todo REST API with auth"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("todo");
        orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert_eq!(state.input_description, "Build a todo REST API with auth");
        assert_eq!(producer.call_count(Phase::Intake), 1);
        assert_eq!(channel.asked()[0].reason, "invalid_input");
    }

    #[tokio::test]
    async fn test_proceed_skips_failing_deployment() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(
            happy_path_producer().then_fail(Phase::Deployment, "invalid api key for registry"),
        );
        let channel = Arc::new(StaticFeedbackChannel::new("proceed"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        let report = orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert_exit_code(&state, 0);
        assert_eq!(producer.call_count(Phase::Deployment), 1);
        assert!(report.errors.iter().all(|e| e.resolved));
    }

    #[tokio::test]
    async fn test_circuit_breaker_escalates_repeated_failures() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(
            happy_path_producer().with_default(Phase::Deployment, StageOutput::error("Invalid output format")),
        );
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        let report = orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Error);
        assert_eq!(producer.call_count(Phase::Deployment), 4);
        assert_eq!(channel.asked()[0].reason, "circuit_breaker");
        assert_eq!(report.errors.len(), 4);
        assert!(report.errors[..3].iter().all(|e| e.recoverable));
        assert!(!report.errors[3].recoverable);

        let third = &producer.contexts_for(Phase::Deployment)[2];
        assert!(third.feedback[0].contains("Error: Invalid output format"));
    }

    #[tokio::test]
    async fn test_guardrail_feedback_reaches_producer() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(
            happy_path_producer().then(Phase::Development, StageOutput::text("print('hello')")),
        );
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = Orchestrator::builder(producer.clone(), channel.clone())
            .with_config(config(&dir))
            .with_guardrails(
                GuardrailRegistry::new().with(Phase::Development, RequireDataKeys::new(&["files"])),
            )
            .build()
            .unwrap();

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        let report = orchestrator.run(&mut state).await.unwrap();

        assert_phase(&state, Phase::Complete);
        assert_eq!(producer.call_count(Phase::Development), 2);
        let counts = report.guardrail_stats["require_data_keys"];
        assert_eq!((counts.passes, counts.failures), (1, 1));
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_resume_from_snapshot() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer());
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = orchestrator(&dir, &producer, &channel);

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        for _ in 0..3 {
            state.advance("earlier session").unwrap();
        }
        let path = orchestrator.store().persist(&mut state, None).unwrap();

        let (resumed, report) = orchestrator.resume(&path).await.unwrap();
        assert_phase(&resumed, Phase::Complete);
        assert_eq!(report.run_id, state.run_id);
        assert_eq!(producer.call_count(Phase::Intake), 0);
        assert_eq!(producer.call_count(Phase::Testing), 1);
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let dir = TempDir::new().unwrap();
        let producer = Arc::new(happy_path_producer());
        let channel = Arc::new(StaticFeedbackChannel::new("abort"));
        let orchestrator = Orchestrator::builder(producer.clone(), channel.clone())
            .with_config(config(&dir).with_max_iterations(2))
            .build()
            .unwrap();

        let mut state = orchestrator.new_state("Build a todo REST API with user accounts");
        let err = orchestrator.run(&mut state).await.unwrap_err();
        assert!(matches!(
            err,
            PhaseflowError::IterationLimit {
                phase: Phase::Development,
                limit: 2
            }
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let producer: Arc<ScriptedProducer> = Arc::new(ScriptedProducer::new());
        let channel = Arc::new(StaticFeedbackChannel::silent());
        let err = Orchestrator::builder(producer, channel)
            .with_config(OrchestratorConfig::new().with_circuit_breaker_threshold(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, PhaseflowError::Config(_)));

        let state = PipelineState::new("x");
        assert_eq!(state.exit_code(), 2);
    }
}
