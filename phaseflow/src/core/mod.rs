//! Core domain model types for phaseflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The `Phase` enum and its transition rule
//! - Phase transition records
//! - Typed stage artifacts
//! - Raw producer output and the structured outcome the router reads

mod artifact;
mod outcome;
mod output;
mod phase;
mod transition;

pub use artifact::{
    Architecture, Component, DeploymentConfig, GeneratedFile, Requirements, StageArtifacts,
    TestResult,
};
pub use outcome::{keys, StageOutcome};
pub use output::{OutcomeStatus, StageOutput};
pub use phase::Phase;
pub use transition::PhaseTransition;
