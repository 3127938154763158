//! Producer trait and a closure-backed implementation.

use super::context::StageContext;
use crate::core::{Phase, StageOutput};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Debug;

/// Produces the output of one stage attempt.
///
/// Any `Err` is treated as an error-status output whose message is the
/// error text.
#[async_trait]
pub trait StageProducer: Send + Sync {
    /// Runs `stage` once.
    async fn produce(&self, stage: Phase, ctx: &StageContext) -> anyhow::Result<StageOutput>;
}

/// Future returned by a [`FnProducer`] closure.
pub type ProducerFuture = BoxFuture<'static, anyhow::Result<StageOutput>>;

/// A producer backed by an async closure.
pub struct FnProducer<F>
where
    F: Fn(Phase, StageContext) -> ProducerFuture + Send + Sync,
{
    func: F,
}

impl<F> FnProducer<F>
where
    F: Fn(Phase, StageContext) -> ProducerFuture + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for FnProducer<F>
where
    F: Fn(Phase, StageContext) -> ProducerFuture + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProducer").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> StageProducer for FnProducer<F>
where
    F: Fn(Phase, StageContext) -> ProducerFuture + Send + Sync,
{
    async fn produce(&self, stage: Phase, ctx: &StageContext) -> anyhow::Result<StageOutput> {
        (self.func)(stage, ctx.clone()).await
    }
}
