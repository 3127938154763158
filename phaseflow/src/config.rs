//! Orchestrator configuration.

use crate::errors::{PhaseflowError, Result};
use crate::persistence::StateStore;
use crate::recovery::{
    BackoffSchedule, CircuitBreaker, ClassifierConfig, ErrorClassifier, JitterStrategy,
    RecoverySelector, DEFAULT_BACKOFF_MS, DEFAULT_THRESHOLD,
};
use crate::routing::{RoutingConfig, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::state::DEFAULT_MAX_RETRIES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the orchestrator needs to know up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Retry ceiling per phase for new runs.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Producer attempts per guardrail-retry loop.
    #[serde(default = "default_max_retries")]
    pub guardrail_max_retries: u32,
    /// Consecutive failures before the breaker forces escalation.
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    /// Backoff delays for retryable failures, in milliseconds.
    #[serde(default = "default_backoff_schedule")]
    pub backoff_schedule_ms: Vec<u64>,
    /// Jitter applied to backoff delays.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Timeout of one producer call.
    #[serde(default = "default_timeout_seconds")]
    pub producer_timeout_seconds: u64,
    /// How long to wait for a human before using the default option.
    #[serde(default = "default_timeout_seconds")]
    pub feedback_timeout_seconds: u64,
    /// Directory for state snapshots.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Persist after every successful phase transition.
    #[serde(default)]
    pub persist_on_success: bool,
    /// Keep content-addressed copies of every snapshot.
    #[serde(default)]
    pub keep_snapshot_history: bool,
    /// Planning confidence below which a human is asked.
    #[serde(default = "default_confidence_threshold")]
    pub clarification_confidence_threshold: f64,
    /// Shortest accepted input description, in characters.
    #[serde(default = "default_min_input_length")]
    pub min_input_length: usize,
    /// Longest accepted input description, in characters.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    /// Upper bound on loop iterations of one `run` call.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Extra classification patterns.
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_breaker_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

fn default_backoff_schedule() -> Vec<u64> {
    DEFAULT_BACKOFF_MS.to_vec()
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./pipeline_state")
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_min_input_length() -> usize {
    10
}

fn default_max_input_length() -> usize {
    10_000
}

fn default_max_iterations() -> usize {
    50
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            guardrail_max_retries: default_max_retries(),
            circuit_breaker_threshold: default_breaker_threshold(),
            backoff_schedule_ms: default_backoff_schedule(),
            jitter: JitterStrategy::None,
            producer_timeout_seconds: default_timeout_seconds(),
            feedback_timeout_seconds: default_timeout_seconds(),
            output_dir: default_output_dir(),
            persist_on_success: false,
            keep_snapshot_history: false,
            clarification_confidence_threshold: default_confidence_threshold(),
            min_input_length: default_min_input_length(),
            max_input_length: default_max_input_length(),
            max_iterations: default_max_iterations(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate().map_err(PhaseflowError::Config)?;
        Ok(config)
    }

    /// Sets the per-phase retry ceiling.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the producer attempts per guardrail loop.
    #[must_use]
    pub fn with_guardrail_max_retries(mut self, max_retries: u32) -> Self {
        self.guardrail_max_retries = max_retries;
        self
    }

    /// Sets the breaker threshold.
    #[must_use]
    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = threshold;
        self
    }

    /// Sets the backoff schedule.
    #[must_use]
    pub fn with_backoff_schedule_ms(mut self, schedule: Vec<u64>) -> Self {
        self.backoff_schedule_ms = schedule;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the producer timeout.
    #[must_use]
    pub fn with_producer_timeout_seconds(mut self, seconds: u64) -> Self {
        self.producer_timeout_seconds = seconds;
        self
    }

    /// Sets the human feedback timeout.
    #[must_use]
    pub fn with_feedback_timeout_seconds(mut self, seconds: u64) -> Self {
        self.feedback_timeout_seconds = seconds;
        self
    }

    /// Sets the snapshot directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Persists after every successful transition.
    #[must_use]
    pub fn with_persist_on_success(mut self, persist: bool) -> Self {
        self.persist_on_success = persist;
        self
    }

    /// Keeps content-addressed snapshot copies.
    #[must_use]
    pub fn with_snapshot_history(mut self, keep: bool) -> Self {
        self.keep_snapshot_history = keep;
        self
    }

    /// Sets the planning confidence threshold.
    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.clarification_confidence_threshold = threshold;
        self
    }

    /// Sets the accepted input length range.
    #[must_use]
    pub fn with_input_length(mut self, min: usize, max: usize) -> Self {
        self.min_input_length = min;
        self.max_input_length = max;
        self
    }

    /// Sets the iteration limit.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the classifier patterns.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    /// Checks the configuration for values the orchestrator cannot run with.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.circuit_breaker_threshold == 0 {
            return Err("circuit_breaker_threshold must be at least 1".to_string());
        }
        if self.producer_timeout_seconds == 0 {
            return Err("producer_timeout_seconds must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.clarification_confidence_threshold) {
            return Err(format!(
                "clarification_confidence_threshold must be within 0.0..=1.0, got {}",
                self.clarification_confidence_threshold
            ));
        }
        if self.min_input_length > self.max_input_length {
            return Err(format!(
                "min_input_length ({}) exceeds max_input_length ({})",
                self.min_input_length, self.max_input_length
            ));
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".to_string());
        }
        Ok(())
    }

    /// Producer timeout as a duration.
    #[must_use]
    pub fn producer_timeout(&self) -> Duration {
        Duration::from_secs(self.producer_timeout_seconds)
    }

    /// Feedback timeout as a duration.
    #[must_use]
    pub fn feedback_timeout(&self) -> Duration {
        Duration::from_secs(self.feedback_timeout_seconds)
    }

    /// The configured backoff schedule.
    #[must_use]
    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::from_millis(&self.backoff_schedule_ms).with_jitter(self.jitter)
    }

    /// The configured recovery selector.
    #[must_use]
    pub fn selector(&self) -> RecoverySelector {
        RecoverySelector::new(CircuitBreaker::new(self.circuit_breaker_threshold), self.backoff())
    }

    /// Builds the classifier, compiling configured patterns.
    pub fn error_classifier(&self) -> Result<ErrorClassifier> {
        ErrorClassifier::from_config(&self.classifier)
    }

    /// The configured snapshot store.
    #[must_use]
    pub fn store(&self) -> StateStore {
        StateStore::new(&self.output_dir).with_history(self.keep_snapshot_history)
    }

    /// The routing tunables.
    #[must_use]
    pub fn routing(&self) -> RoutingConfig {
        RoutingConfig {
            confidence_threshold: self.clarification_confidence_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.circuit_breaker_threshold, 3);
        assert_eq!(config.backoff_schedule_ms, vec![1000, 2000, 4000, 8000]);
        assert_eq!(config.clarification_confidence_threshold, 0.7);
        assert_eq!(config.output_dir, PathBuf::from("./pipeline_state"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"max_retries": 5, "jitter": "equal"}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.jitter, JitterStrategy::Equal);
        assert_eq!(config.guardrail_max_retries, 3);
        assert_eq!(config.feedback_timeout_seconds, 300);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(OrchestratorConfig::new()
            .with_circuit_breaker_threshold(0)
            .validate()
            .is_err());
        assert!(OrchestratorConfig::new()
            .with_confidence_threshold(1.5)
            .validate()
            .is_err());
        assert!(OrchestratorConfig::new()
            .with_input_length(100, 10)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"circuit_breaker_threshold": 5, "persist_on_success": true}}"#).unwrap();

        let config = OrchestratorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert!(config.persist_on_success);
        assert_eq!(config.selector().breaker().threshold(), 5);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_iterations": 0}}"#).unwrap();
        let err = OrchestratorConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, PhaseflowError::Config(_)));
    }

    #[test]
    fn test_backoff_from_config() {
        let config = OrchestratorConfig::new().with_backoff_schedule_ms(vec![5, 10]);
        let backoff = config.backoff();
        assert_eq!(backoff.delay(0), Duration::from_millis(5));
        assert_eq!(backoff.delay(7), Duration::from_millis(10));
    }
}
