//! Canned stage outputs.

use serde_json::json;
use std::collections::HashMap;

use super::mocks::ScriptedProducer;
use crate::core::{keys, Architecture, Component, Phase, Requirements, StageOutput};

/// Requirements that pass the structural check.
#[must_use]
pub fn sample_requirements() -> Requirements {
    Requirements {
        summary: "A REST API for managing todo items with user accounts".to_string(),
        user_stories: vec![
            "As a user I can register and log in".to_string(),
            "As a user I can create, list and complete todos".to_string(),
        ],
        acceptance_criteria: vec!["Unauthenticated requests get 401".to_string()],
    }
}

/// Architecture that passes the structural check.
#[must_use]
pub fn sample_architecture() -> Architecture {
    Architecture {
        overview: "Single HTTP service backed by SQLite".to_string(),
        components: vec![
            Component {
                name: "api".to_string(),
                responsibility: "HTTP routing and validation".to_string(),
            },
            Component {
                name: "store".to_string(),
                responsibility: "Persistence".to_string(),
            },
        ],
        tech_stack: vec!["python".to_string(), "fastapi".to_string()],
    }
}

/// Intake accepted the request.
#[must_use]
pub fn intake_success_output() -> StageOutput {
    StageOutput::success_value("validated", json!(true))
}

/// A complete plan with the given confidence.
#[must_use]
pub fn planning_success_output(confidence: f64) -> StageOutput {
    StageOutput::success_value(keys::REQUIREMENTS, json!(sample_requirements()))
        .with_data(keys::ARCHITECTURE, json!(sample_architecture()))
        .with_data(keys::CONFIDENCE, json!(confidence))
}

/// Two generated files.
#[must_use]
pub fn development_success_output() -> StageOutput {
    StageOutput::success_value(
        keys::FILES,
        json!([
            {"path": "app/main.py", "content": "app = FastAPI()", "language": "python"},
            {"path": "tests/test_main.py", "content": "def test_ok(): pass", "language": "python"},
        ]),
    )
}

/// All tests passed.
#[must_use]
pub fn testing_success_output() -> StageOutput {
    StageOutput::success_value(
        keys::TEST_RESULT,
        json!({"passed": 12, "failed": 0, "coverage": 0.87}),
    )
}

/// Some tests failed.
#[must_use]
pub fn tests_failed_output(critical: bool) -> StageOutput {
    let mut data = HashMap::new();
    data.insert(
        keys::TEST_RESULT.to_string(),
        json!({
            "passed": 10,
            "failed": 2,
            "failures": ["test_login_rejects_bad_password", "test_list_requires_auth"],
            "critical_failures": critical,
        }),
    );
    data.insert(
        keys::FEEDBACK.to_string(),
        json!("2 tests failed: test_login_rejects_bad_password, test_list_requires_auth"),
    );
    StageOutput::tests_failed(data)
}

/// A deployment config.
#[must_use]
pub fn deployment_success_output() -> StageOutput {
    StageOutput::success_value(
        keys::DEPLOYMENT_CONFIG,
        json!({"target": "docker", "files": {"Dockerfile": "FROM python:3.12-slim"}}),
    )
}

/// A producer whose every stage succeeds.
#[must_use]
pub fn happy_path_producer() -> ScriptedProducer {
    ScriptedProducer::new()
        .with_default(Phase::Intake, intake_success_output())
        .with_default(Phase::Planning, planning_success_output(0.9))
        .with_default(Phase::Development, development_success_output())
        .with_default(Phase::Testing, testing_success_output())
        .with_default(Phase::Deployment, deployment_success_output())
}
