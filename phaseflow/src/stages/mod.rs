//! The stage producer seam.
//!
//! Producers do the real work of each phase (usually by calling an LLM).
//! The core only sees them through [`StageProducer`].

mod context;
mod producer;

pub use context::StageContext;
pub use producer::{FnProducer, ProducerFuture, StageProducer};
