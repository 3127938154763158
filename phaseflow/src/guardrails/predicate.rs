//! Guardrail predicates.

use crate::core::StageOutput;
use std::fmt::Debug;
use std::sync::Arc;

/// Result of checking one output.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardrailVerdict {
    /// The output is acceptable. Carries the validated (possibly
    /// normalized) output.
    Pass(StageOutput),
    /// The output was rejected. Carries feedback for the next attempt.
    Fail(String),
}

impl GuardrailVerdict {
    /// Returns true for [`GuardrailVerdict::Pass`].
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }
}

/// A content-validation rule applied to stage output.
///
/// Pure from the orchestrator's point of view: the same output must give
/// the same verdict.
pub trait GuardrailPredicate: Send + Sync + Debug {
    /// Name used for logging and counters.
    fn name(&self) -> &str;

    /// Checks one output.
    fn check(&self, output: &StageOutput) -> GuardrailVerdict;
}

/// Accepts every output. Used for stages with no registered guardrail.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl GuardrailPredicate for AcceptAll {
    fn name(&self) -> &str {
        "accept_all"
    }

    fn check(&self, output: &StageOutput) -> GuardrailVerdict {
        GuardrailVerdict::Pass(output.clone())
    }
}

/// A guardrail backed by a closure returning `Err(feedback)` on rejection.
pub struct FnGuardrail<F>
where
    F: Fn(&StageOutput) -> Result<(), String> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnGuardrail<F>
where
    F: Fn(&StageOutput) -> Result<(), String> + Send + Sync,
{
    /// Creates a named closure guardrail.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnGuardrail<F>
where
    F: Fn(&StageOutput) -> Result<(), String> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnGuardrail").field("name", &self.name).finish()
    }
}

impl<F> GuardrailPredicate for FnGuardrail<F>
where
    F: Fn(&StageOutput) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, output: &StageOutput) -> GuardrailVerdict {
        match (self.func)(output) {
            Ok(()) => GuardrailVerdict::Pass(output.clone()),
            Err(feedback) => GuardrailVerdict::Fail(feedback),
        }
    }
}

/// Requires a set of keys in the output's data map.
#[derive(Debug, Clone)]
pub struct RequireDataKeys {
    name: String,
    keys: Vec<String>,
}

impl RequireDataKeys {
    /// Creates the guardrail.
    #[must_use]
    pub fn new(keys: &[&str]) -> Self {
        Self {
            name: "require_data_keys".to_string(),
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
        }
    }

    /// Overrides the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl GuardrailPredicate for RequireDataKeys {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, output: &StageOutput) -> GuardrailVerdict {
        let missing: Vec<&str> = self
            .keys
            .iter()
            .filter(|key| output.get(key).map_or(true, serde_json::Value::is_null))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            GuardrailVerdict::Pass(output.clone())
        } else {
            GuardrailVerdict::Fail(format!("missing required fields: {}", missing.join(", ")))
        }
    }
}

/// Runs predicates in order; the first rejection wins.
///
/// Each predicate sees the output validated by the one before it.
#[derive(Debug, Clone)]
pub struct GuardrailChain {
    name: String,
    predicates: Vec<Arc<dyn GuardrailPredicate>>,
}

impl GuardrailChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicates: Vec::new(),
        }
    }

    /// Appends a predicate.
    #[must_use]
    pub fn with(mut self, predicate: impl GuardrailPredicate + 'static) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// Number of predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Returns true if the chain has no predicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl GuardrailPredicate for GuardrailChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, output: &StageOutput) -> GuardrailVerdict {
        let mut current = output.clone();
        for predicate in &self.predicates {
            match predicate.check(&current) {
                GuardrailVerdict::Pass(validated) => current = validated,
                GuardrailVerdict::Fail(feedback) => {
                    return GuardrailVerdict::Fail(format!("{}: {feedback}", predicate.name()));
                }
            }
        }
        GuardrailVerdict::Pass(current)
    }
}
