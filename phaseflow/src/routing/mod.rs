//! Routing between phases.
//!
//! Routing is split in two: [`next_step`] is a pure table from
//! `(phase, outcome, state)` to a [`NextStep`], and [`apply`] performs the
//! state mutation that step implies. Error steps are not resolved here;
//! `apply` hands back a [`PhaseFailure`](crate::recovery::PhaseFailure) for
//! the recovery handler.

mod apply;
mod step;
mod table;
#[cfg(test)]
mod routing_tests;

pub use apply::{apply, route};
pub use step::NextStep;
pub use table::{
    next_step, route_after_deployment, route_after_development, route_after_intake,
    route_after_planning, route_after_testing, RoutingConfig, DEFAULT_CONFIDENCE_THRESHOLD,
};
