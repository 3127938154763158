//! Human feedback gate.
//!
//! When the pipeline escalates, a structured question is staged in the
//! state's metadata. The gate asks a [`HumanFeedbackChannel`] for an
//! answer, bounded by a timeout that falls back to the default option, and
//! parses the answer into a [`FeedbackDecision`].

mod channel;
mod decision;
mod gate;
mod pending;

pub use channel::{FeedbackRequest, HumanFeedbackChannel};
#[cfg(test)]
pub use channel::MockHumanFeedbackChannel;
pub use decision::FeedbackDecision;
pub use gate::{FeedbackResolution, HumanFeedbackGate};
pub use pending::PendingFeedbackChannel;
