//! Per-stage guardrail registry.

use super::predicate::{AcceptAll, GuardrailPredicate};
use crate::core::Phase;
use std::collections::HashMap;
use std::sync::Arc;

/// Guardrails registered per stage, resolved once when the orchestrator is
/// built.
#[derive(Debug, Clone, Default)]
pub struct GuardrailRegistry {
    guardrails: HashMap<Phase, Arc<dyn GuardrailPredicate>>,
}

impl GuardrailRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `predicate` for `stage`, replacing any earlier one.
    #[must_use]
    pub fn with(mut self, stage: Phase, predicate: impl GuardrailPredicate + 'static) -> Self {
        self.register(stage, Arc::new(predicate));
        self
    }

    /// Registers a shared predicate for `stage`.
    pub fn register(&mut self, stage: Phase, predicate: Arc<dyn GuardrailPredicate>) {
        self.guardrails.insert(stage, predicate);
    }

    /// The predicate for `stage`, or one that accepts everything.
    #[must_use]
    pub fn resolve(&self, stage: Phase) -> Arc<dyn GuardrailPredicate> {
        self.guardrails
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| Arc::new(AcceptAll))
    }

    /// Returns true if `stage` has a registered predicate.
    #[must_use]
    pub fn contains(&self, stage: Phase) -> bool {
        self.guardrails.contains_key(&stage)
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }
}
