//! Error classification by message heuristics.
//!
//! Categories are checked in strict priority order: fatal, then retryable,
//! then recoverable as the catch-all. A message that mentions both a fatal
//! and a retryable keyword is fatal.

use crate::errors::PhaseflowError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to a phase-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transient; the same request may succeed later.
    Retryable,
    /// The output was wrong; retry with corrective feedback.
    Recoverable,
    /// Retrying cannot help; a human must decide.
    Fatal,
}

impl ErrorCategory {
    /// Returns the string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Recoverable => "recoverable",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const FATAL_KEYWORDS: &[&str] = &[
    "model not found",
    "out of memory",
    "critical security violation",
    "cannot load",
    "invalid api key",
    "authentication failed",
];

const RETRYABLE_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "rate-limit",
    "connection refused",
    "connection reset",
    "503",
    "429",
    "service unavailable",
    "temporarily unavailable",
    "try again",
    "retry",
    "ollama",
    "openai",
    "anthropic",
    "upstream",
];

const RECOVERABLE_KEYWORDS: &[&str] = &[
    "guardrail",
    "schema",
    "validation",
    "invalid",
    "parse",
    "format",
    "json",
];

/// A raw error to classify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The error message.
    pub message: String,
    /// Optional stack trace. Logged, never matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl ErrorRecord {
    /// Creates a record from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
        }
    }

    /// Sets the stack trace.
    #[must_use]
    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }

    /// Reads a record from a JSON object with an `error` (or `message`) key.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        let message = value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let stack_trace = value
            .get("stack_trace")
            .and_then(serde_json::Value::as_str)
            .map(String::from);
        Self {
            message: message.to_string(),
            stack_trace,
        }
    }
}

impl From<&str> for ErrorRecord {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Extra classification rules, as regular expressions.
///
/// Each list is tried after the built-in keywords of the same category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Additional fatal patterns.
    #[serde(default)]
    pub fatal_patterns: Vec<String>,
    /// Additional retryable patterns.
    #[serde(default)]
    pub retryable_patterns: Vec<String>,
}

/// Which rule decided a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedRule {
    /// A built-in keyword.
    Keyword(&'static str),
    /// A configured pattern.
    Pattern(String),
    /// Nothing matched; recoverable by default.
    Default,
}

/// A category together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The category.
    pub category: ErrorCategory,
    /// The deciding rule.
    pub rule: MatchedRule,
}

/// Maps error messages to categories.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    fatal_patterns: Vec<Regex>,
    retryable_patterns: Vec<Regex>,
}

impl ErrorClassifier {
    /// Creates a classifier with only the built-in keywords.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classifier with configured extra patterns.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, PhaseflowError> {
        Ok(Self {
            fatal_patterns: compile(&config.fatal_patterns)?,
            retryable_patterns: compile(&config.retryable_patterns)?,
        })
    }

    /// Classifies a record.
    #[must_use]
    pub fn classify(&self, record: &ErrorRecord) -> ErrorCategory {
        self.explain(record).category
    }

    /// Classifies a bare message.
    #[must_use]
    pub fn classify_message(&self, message: &str) -> ErrorCategory {
        self.classify(&ErrorRecord::new(message))
    }

    /// Classifies a record and reports the deciding rule.
    #[must_use]
    pub fn explain(&self, record: &ErrorRecord) -> Classification {
        let lowered = record.message.to_lowercase();

        let tiers: [(ErrorCategory, &[&'static str], &[Regex]); 3] = [
            (ErrorCategory::Fatal, FATAL_KEYWORDS, self.fatal_patterns.as_slice()),
            (ErrorCategory::Retryable, RETRYABLE_KEYWORDS, self.retryable_patterns.as_slice()),
            (ErrorCategory::Recoverable, RECOVERABLE_KEYWORDS, &[]),
        ];

        for (category, keywords, patterns) in tiers {
            if let Some(&keyword) = keywords.iter().find(|k| lowered.contains(**k)) {
                return Classification {
                    category,
                    rule: MatchedRule::Keyword(keyword),
                };
            }
            if let Some(pattern) = patterns.iter().find(|p| p.is_match(&record.message)) {
                return Classification {
                    category,
                    rule: MatchedRule::Pattern(pattern.as_str().to_string()),
                };
            }
        }

        Classification {
            category: ErrorCategory::Recoverable,
            rule: MatchedRule::Default,
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, PhaseflowError> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| PhaseflowError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}
