//! Raw stage output returned by producers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Discriminated status of a stage result.
///
/// `Other` keeps domain-specific codes a producer may return without the
/// core having to know them in advance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutcomeStatus {
    /// The stage did its job.
    Success,
    /// The stage failed.
    Error,
    /// The input was rejected before reaching a producer.
    Invalid,
    /// Tests ran and some failed.
    TestsFailed,
    /// Any other status code.
    Other(String),
}

impl OutcomeStatus {
    /// Returns the wire form of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Invalid => "invalid",
            Self::TestsFailed => "tests_failed",
            Self::Other(code) => code,
        }
    }

    /// Returns true for [`OutcomeStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<String> for OutcomeStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "success" | "ok" => Self::Success,
            "error" | "fail" | "failed" => Self::Error,
            "invalid" => Self::Invalid,
            "tests_failed" => Self::TestsFailed,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for OutcomeStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<OutcomeStatus> for String {
    fn from(value: OutcomeStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The output of one producer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// Result status.
    pub status: OutcomeStatus,

    /// Free-text output (e.g. the model's raw reply).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Structured payload fields.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,

    /// Error message for failed executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageOutput {
    /// Creates an output with the given status and no payload.
    #[must_use]
    pub fn with_status(status: impl Into<OutcomeStatus>) -> Self {
        Self {
            status: status.into(),
            content: None,
            data: HashMap::new(),
            error: None,
        }
    }

    /// Creates a successful output with data.
    #[must_use]
    pub fn success(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data,
            ..Self::with_status(OutcomeStatus::Success)
        }
    }

    /// Creates a successful output with a single value.
    #[must_use]
    pub fn success_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value);
        Self::success(data)
    }

    /// Creates a successful output holding only text.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Success).with_content(content)
    }

    /// Creates a failed output.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::with_status(OutcomeStatus::Error)
        }
    }

    /// Creates an output for rejected input.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::with_status(OutcomeStatus::Invalid)
        }
    }

    /// Creates an output for a test run with failures.
    #[must_use]
    pub fn tests_failed(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data,
            ..Self::with_status(OutcomeStatus::TestsFailed)
        }
    }

    /// Sets the free-text content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Adds a data field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns true if the status is success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the status is error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == OutcomeStatus::Error
    }

    /// Returns true when there is neither content nor data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, |c| c.trim().is_empty()) && self.data.is_empty()
    }

    /// Gets a data field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Deserializes a data field into a typed value.
    ///
    /// Returns `None` when the key is absent and `Some(Err(_))` when it does
    /// not match the expected schema.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        self.data
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
    }

    /// Reads a boolean flag, defaulting to `false`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.data
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}
