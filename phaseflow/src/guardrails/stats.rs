//! Pass/fail counters per guardrail name.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Counts for one guardrail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailCounts {
    /// Outputs accepted.
    pub passes: u64,
    /// Outputs rejected.
    pub failures: u64,
}

impl GuardrailCounts {
    /// Share of checks that passed, or `None` before any check.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pass_rate(&self) -> Option<f64> {
        let total = self.passes + self.failures;
        if total == 0 {
            None
        } else {
            Some(self.passes as f64 / total as f64)
        }
    }
}

/// Shared, concurrent guardrail counters.
#[derive(Debug, Clone, Default)]
pub struct GuardrailStats {
    counts: Arc<DashMap<String, GuardrailCounts>>,
}

impl GuardrailStats {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a pass.
    pub fn record_pass(&self, guardrail: &str) {
        self.counts.entry(guardrail.to_string()).or_default().passes += 1;
    }

    /// Counts a failure.
    pub fn record_failure(&self, guardrail: &str) {
        self.counts.entry(guardrail.to_string()).or_default().failures += 1;
    }

    /// Counts for one guardrail.
    #[must_use]
    pub fn get(&self, guardrail: &str) -> GuardrailCounts {
        self.counts
            .get(guardrail)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    /// A sorted copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, GuardrailCounts> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}
