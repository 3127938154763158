//! Testing utilities for phaseflow hosts and the crate's own tests.
//!
//! This module provides:
//! - A scripted stage producer and a canned feedback channel
//! - Fixture outputs for every stage
//! - Assertions over pipeline state

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_exit_code, assert_history_valid, assert_phase, assert_visited};
pub use fixtures::{
    deployment_success_output, development_success_output, happy_path_producer,
    intake_success_output, planning_success_output, sample_architecture, sample_requirements,
    testing_success_output, tests_failed_output,
};
pub use mocks::{ScriptedProducer, ScriptedResponse, StaticFeedbackChannel};
