//! Cooperative cancellation for a running pipeline.

mod token;

pub use token::CancellationToken;
