//! Typed stage artifacts stored in the pipeline state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Requirements produced by the planning stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    /// One-paragraph summary of what is being built.
    #[serde(default)]
    pub summary: String,
    /// User stories.
    #[serde(default)]
    pub user_stories: Vec<String>,
    /// Acceptance criteria.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

impl Requirements {
    /// Returns true when the summary is present and at least one story exists.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.summary.trim().is_empty() && !self.user_stories.is_empty()
    }
}

/// A named component of the architecture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Component name.
    pub name: String,
    /// What the component is responsible for.
    #[serde(default)]
    pub responsibility: String,
}

/// Architecture produced by the planning stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    /// High-level description.
    #[serde(default)]
    pub overview: String,
    /// Components.
    #[serde(default)]
    pub components: Vec<Component>,
    /// Chosen technologies.
    #[serde(default)]
    pub tech_stack: Vec<String>,
}

impl Architecture {
    /// Returns true when the overview is present and at least one component exists.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.overview.trim().is_empty() && !self.components.is_empty()
    }
}

/// A file produced by the development stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Relative path.
    pub path: String,
    /// File contents.
    pub content: String,
    /// Source language, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl GeneratedFile {
    /// Creates a generated file.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            language: None,
        }
    }
}

/// Result of the testing stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Passing tests.
    #[serde(default)]
    pub passed: u32,
    /// Failing tests.
    #[serde(default)]
    pub failed: u32,
    /// Line coverage in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// Failure descriptions.
    #[serde(default)]
    pub failures: Vec<String>,
    /// Failures that must not be retried automatically.
    #[serde(default)]
    pub critical_failures: bool,
}

/// Deployment configuration produced by the deployment stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment target (e.g. "docker", "kubernetes").
    #[serde(default)]
    pub target: String,
    /// Deployment files keyed by name.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One optional slot per completed phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageArtifacts {
    /// Planning requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
    /// Planning architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    /// Development output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_files: Option<Vec<GeneratedFile>>,
    /// Testing output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result: Option<TestResult>,
    /// Deployment output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_config: Option<DeploymentConfig>,
}

impl StageArtifacts {
    /// Renders the artifacts as a JSON object for producer contexts.
    #[must_use]
    pub fn to_context_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements_completeness() {
        let mut req = Requirements::default();
        assert!(!req.is_complete());
        req.summary = "Todo API".to_string();
        assert!(!req.is_complete());
        req.user_stories.push("As a user I can add a todo".to_string());
        assert!(req.is_complete());
    }

    #[test]
    fn test_architecture_completeness() {
        let arch = Architecture {
            overview: "   ".to_string(),
            components: vec![Component {
                name: "api".to_string(),
                responsibility: "http".to_string(),
            }],
            tech_stack: vec![],
        };
        assert!(!arch.is_complete());
    }

    #[test]
    fn test_empty_slots_are_not_serialized() {
        let json = serde_json::to_value(StageArtifacts::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
