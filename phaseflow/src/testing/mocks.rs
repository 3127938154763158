//! Scripted collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::core::{Phase, StageOutput};
use crate::feedback::{FeedbackRequest, HumanFeedbackChannel};
use crate::stages::{StageContext, StageProducer};

/// One scripted producer response.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Return this output.
    Output(StageOutput),
    /// Return `Err` with this message.
    Failure(String),
    /// Never return.
    Hang,
}

/// A producer that replays scripted responses per stage.
///
/// Scripted responses are used first, in order. Once a stage's script is
/// empty its default output (if any) is returned on every call.
#[derive(Debug, Default)]
pub struct ScriptedProducer {
    scripts: Mutex<HashMap<Phase, VecDeque<ScriptedResponse>>>,
    defaults: Mutex<HashMap<Phase, StageOutput>>,
    calls: Mutex<Vec<(Phase, StageContext)>>,
}

impl ScriptedProducer {
    /// Creates a producer with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an output for `stage`.
    #[must_use]
    pub fn then(self, stage: Phase, output: StageOutput) -> Self {
        self.push(stage, ScriptedResponse::Output(output));
        self
    }

    /// Queues a transport failure for `stage`.
    #[must_use]
    pub fn then_fail(self, stage: Phase, message: impl Into<String>) -> Self {
        self.push(stage, ScriptedResponse::Failure(message.into()));
        self
    }

    /// Queues a call that never returns.
    #[must_use]
    pub fn then_hang(self, stage: Phase) -> Self {
        self.push(stage, ScriptedResponse::Hang);
        self
    }

    /// Sets the output returned once the script for `stage` runs out.
    #[must_use]
    pub fn with_default(self, stage: Phase, output: StageOutput) -> Self {
        self.defaults.lock().insert(stage, output);
        self
    }

    /// Queues a response.
    pub fn push(&self, stage: Phase, response: ScriptedResponse) {
        self.scripts.lock().entry(stage).or_default().push_back(response);
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(Phase, StageContext)> {
        self.calls.lock().clone()
    }

    /// Calls made for `stage`.
    #[must_use]
    pub fn call_count(&self, stage: Phase) -> usize {
        self.calls.lock().iter().filter(|(s, _)| *s == stage).count()
    }

    /// Contexts passed for `stage`, in call order.
    #[must_use]
    pub fn contexts_for(&self, stage: Phase) -> Vec<StageContext> {
        self.calls
            .lock()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, ctx)| ctx.clone())
            .collect()
    }
}

#[async_trait]
impl StageProducer for ScriptedProducer {
    async fn produce(&self, stage: Phase, ctx: &StageContext) -> anyhow::Result<StageOutput> {
        self.calls.lock().push((stage, ctx.clone()));
        let next = self
            .scripts
            .lock()
            .get_mut(&stage)
            .and_then(VecDeque::pop_front);
        let response = match next {
            Some(response) => response,
            None => match self.defaults.lock().get(&stage) {
                Some(output) => ScriptedResponse::Output(output.clone()),
                None => anyhow::bail!("no scripted output for stage '{stage}'"),
            },
        };

        match response {
            ScriptedResponse::Output(output) => Ok(output),
            ScriptedResponse::Failure(message) => Err(anyhow::anyhow!(message)),
            ScriptedResponse::Hang => std::future::pending().await,
        }
    }
}

/// A feedback channel that gives canned answers in order.
///
/// After the queue runs out the last answer repeats. With no answers at all
/// every call fails, which makes the gate use the default option.
#[derive(Debug, Default)]
pub struct StaticFeedbackChannel {
    answers: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    asked: Mutex<Vec<FeedbackRequest>>,
}

impl StaticFeedbackChannel {
    /// Always answers `answer`.
    #[must_use]
    pub fn new(answer: impl Into<String>) -> Self {
        Self::sequence([answer.into()])
    }

    /// Answers in order, then repeats the last answer.
    #[must_use]
    pub fn sequence(answers: impl IntoIterator<Item = String>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Never answers successfully.
    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    /// Every request received.
    #[must_use]
    pub fn asked(&self) -> Vec<FeedbackRequest> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl HumanFeedbackChannel for StaticFeedbackChannel {
    async fn ask(&self, request: &FeedbackRequest) -> anyhow::Result<String> {
        self.asked.lock().push(request.clone());
        let mut last = self.last.lock();
        if let Some(answer) = self.answers.lock().pop_front() {
            *last = Some(answer);
        }
        last.clone()
            .ok_or_else(|| anyhow::anyhow!("no answer configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_default() {
        let producer = ScriptedProducer::new()
            .then_fail(Phase::Planning, "503 service unavailable")
            .with_default(Phase::Planning, StageOutput::text("plan"));
        let ctx = StageContext::new(Phase::Planning, "x");

        assert!(producer.produce(Phase::Planning, &ctx).await.is_err());
        assert!(producer.produce(Phase::Planning, &ctx).await.is_ok());
        assert!(producer.produce(Phase::Planning, &ctx).await.is_ok());
        assert!(producer.produce(Phase::Testing, &ctx).await.is_err());
        assert_eq!(producer.call_count(Phase::Planning), 3);
    }

    #[tokio::test]
    async fn test_static_channel_repeats_last_answer() {
        let channel = StaticFeedbackChannel::sequence(["retry".to_string(), "abort".to_string()]);
        let request = FeedbackRequest::from_escalation(
            &crate::state::EscalationRequest::new(Phase::Testing, "r", "q"),
            "run",
            1,
        );
        assert_eq!(channel.ask(&request).await.unwrap(), "retry");
        assert_eq!(channel.ask(&request).await.unwrap(), "abort");
        assert_eq!(channel.ask(&request).await.unwrap(), "abort");
        assert_eq!(channel.asked().len(), 3);

        assert!(StaticFeedbackChannel::silent().ask(&request).await.is_err());
    }
}
