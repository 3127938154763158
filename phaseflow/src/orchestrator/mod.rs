//! The phase orchestrator.
//!
//! Drives one [`PipelineState`](crate::state::PipelineState) through its
//! phases: each stage runs under its guardrail, the outcome is routed,
//! failures go through recovery and escalations wait on the human feedback
//! gate.

mod builder;
mod report;
mod runner;
#[cfg(test)]
mod integration_tests;

pub use builder::OrchestratorBuilder;
pub use report::RunReport;
pub use runner::Orchestrator;
